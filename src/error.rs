//! Error types for a quality run.
//!
//! Per-record and per-image problems are never errors: they become
//! [`Issue`](crate::core_modules::issue::Issue) values. The variants here
//! cover the one semantic fatal condition (no manifest) and failures
//! writing the run's outputs.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment extraction or merge error.
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// A configuration field has an invalid value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        Self::Figment(Box::new(error))
    }
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum QcError {
    /// The label manifest does not exist; nothing can be validated.
    #[error("Missing labels file: {}", path.display())]
    ManifestMissing { path: PathBuf },

    /// A CSV file could not be read or written.
    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Filesystem failure outside of per-image analysis.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The report document could not be serialized.
    #[error("Failed to write report {}: {source}", path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Walking the raw-data tree for a snapshot failed.
    #[error("Failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl QcError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    /// True when the run stopped before any output could be produced.
    pub fn is_fatal_input(&self) -> bool {
        matches!(self, Self::ManifestMissing { .. })
    }
}
