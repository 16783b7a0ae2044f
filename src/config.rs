//! Layered configuration loading using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`DATASET_QC_*` prefix, `__` as separator)
//! 2. An explicit TOML file, or `dataset_qc.toml` in the working directory
//! 3. Built-in defaults
//!
//! `DATASET_QC_THRESHOLDS__MIN_WIDTH=640` maps to `thresholds.min_width`.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const LOCAL_CONFIG_FILE: &str = "dataset_qc.toml";
const ENV_PREFIX: &str = "DATASET_QC_";

fn default_allowed_labels() -> Vec<String> {
    ["open_palm", "fist", "thumbs_up", "thumbs_down", "ok_sign"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Detection thresholds. Treated as immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QualityThresholds {
    #[serde(default = "default_allowed_labels")]
    pub allowed_labels: Vec<String>,
    pub min_width: u32,
    pub min_height: u32,
    /// Laplacian variance below this is considered blurry.
    pub blur_laplacian_var_min: f64,
    /// Mean grayscale brightness band, 0..255. Bounds are inclusive.
    pub mean_brightness_min: f64,
    pub mean_brightness_max: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            allowed_labels: default_allowed_labels(),
            min_width: 320,
            min_height: 240,
            blur_laplacian_var_min: 100.0,
            mean_brightness_min: 40.0,
            mean_brightness_max: 210.0,
        }
    }
}

impl QualityThresholds {
    pub fn is_allowed_label(&self, label: &str) -> bool {
        self.allowed_labels.iter().any(|allowed| allowed == label)
    }
}

/// Where the pipeline reads from and writes to.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub labels_csv: PathBuf,
    pub issues_csv: PathBuf,
    pub report_path: PathBuf,
    pub releases_dir: PathBuf,
    pub audit_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            labels_csv: PathBuf::from("data/raw/labels.csv"),
            issues_csv: PathBuf::from("reports/issues.csv"),
            report_path: PathBuf::from("reports/quality_report.json"),
            releases_dir: PathBuf::from("data/releases"),
            audit_log: PathBuf::from("logs/audit_log.csv"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct QcConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub thresholds: QualityThresholds,
}

impl QcConfig {
    /// Load configuration from defaults, the local TOML file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`QcConfig::load`], but reads `config_file` instead of the
    /// working-directory default when one is given.
    pub fn load_from(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(config_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Build the figment provider chain.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        match config_file {
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                let local = PathBuf::from(LOCAL_CONFIG_FILE);
                if local.exists() {
                    figment = figment.merge(Toml::file(local));
                }
            }
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = &self.thresholds;
        if thresholds.allowed_labels.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "thresholds.allowed_labels".into(),
                reason: "at least one label must be allowed".into(),
            });
        }
        if thresholds.mean_brightness_min > thresholds.mean_brightness_max {
            return Err(ConfigError::InvalidValue {
                field: "thresholds.mean_brightness_min".into(),
                reason: format!(
                    "{} is greater than mean_brightness_max {}",
                    thresholds.mean_brightness_min, thresholds.mean_brightness_max
                ),
            });
        }
        Ok(())
    }
}
