// THEORY:
// The `pipeline` module is the top-level API of the crate. It wires the
// component modules into one run, in a fixed order:
//
//   manifest -> Validator -> fresh issues
//            -> reconcile against the persisted list -> reconciled issues
//            -> persist, report, snapshot, audit
//
// The only fatal input condition is a missing manifest, and it is detected
// before anything is written: a failed run leaves no report, no snapshot and no
// audit row behind. Everything the validator finds is data and never aborts.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use tracing::info;

use crate::config::QcConfig;
use crate::core_modules::audit::{self, AuditEntry};
use crate::core_modules::issue::{Issue, IssueCounts};
use crate::core_modules::lifecycle;
use crate::core_modules::manifest::Manifest;
use crate::core_modules::report::QualityReport;
use crate::core_modules::snapshot;
use crate::core_modules::validator::Validator;
use crate::error::QcError;

/// Outcome of validation plus reconciliation, before anything is written.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub manifest: Manifest,
    pub issues: Vec<Issue>,
}

impl Assessment {
    pub fn counts(&self) -> IssueCounts {
        IssueCounts::tally(&self.issues)
    }
}

/// Where a completed run left its outputs, and what it found.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub issues_csv: PathBuf,
    pub report_path: PathBuf,
    pub release_path: PathBuf,
    pub audit_log: PathBuf,
    pub label_rows: usize,
    pub counts: IssueCounts,
}

/// The main, top-level struct for a dataset quality run.
pub struct QualityPipeline {
    config: QcConfig,
    show_progress: bool,
}

impl QualityPipeline {
    pub fn new(config: QcConfig) -> Self {
        Self {
            config,
            show_progress: false,
        }
    }

    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    pub fn config(&self) -> &QcConfig {
        &self.config
    }

    /// Validates the dataset and carries statuses over from the persisted
    /// issue list. Writes nothing.
    pub fn assess(&self) -> Result<Assessment, QcError> {
        let paths = &self.config.paths;
        let validator =
            Validator::new(self.config.thresholds.clone()).show_progress(self.show_progress);
        let (manifest, fresh) = validator.validate_dataset(&paths.labels_csv, &paths.raw_dir)?;

        let previous = lifecycle::load_previous(&paths.issues_csv)?;
        let issues = lifecycle::reconcile(fresh, previous.as_deref());

        Ok(Assessment { manifest, issues })
    }

    /// Executes a full run stamped with `now`.
    pub fn run(&self, now: DateTime<Local>) -> Result<RunSummary, QcError> {
        let paths = &self.config.paths;
        let Assessment { manifest, issues } = self.assess()?;
        let counts = IssueCounts::tally(&issues);

        lifecycle::save_issues(&paths.issues_csv, &issues)?;
        QualityReport::build(&manifest, &issues).write(&paths.report_path)?;
        let release_path =
            snapshot::create_release(&paths.raw_dir, &paths.releases_dir, now.naive_local())?;

        audit::append(
            &paths.audit_log,
            &AuditEntry {
                timestamp: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
                release_path: release_path.display().to_string(),
                label_rows: manifest.len(),
                issues_total: counts.total,
                issues_open: counts.open,
                issues_resolved: counts.resolved,
            },
        )?;

        info!(
            label_rows = manifest.len(),
            issues = counts.total,
            open = counts.open,
            resolved = counts.resolved,
            "pipeline complete"
        );

        Ok(RunSummary {
            issues_csv: paths.issues_csv.clone(),
            report_path: paths.report_path.clone(),
            release_path,
            audit_log: paths.audit_log.clone(),
            label_rows: manifest.len(),
            counts,
        })
    }

    /// Takes a release snapshot of the raw-data directory on its own.
    pub fn snapshot(&self, now: DateTime<Local>) -> Result<PathBuf, QcError> {
        let paths = &self.config.paths;
        snapshot::create_release(&paths.raw_dir, &paths.releases_dir, now.naive_local())
    }
}
