// THEORY:
// The report is a point-in-time snapshot of one run, written for people rather
// than for the next run. It is a single JSON document with one section per
// "sheet": headline counts, label and severity distributions, and full dumps
// of the manifest rows and the reconciled issues. Sections that would be empty
// tables (no label column, no issues) are left out.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::core_modules::issue::{Issue, IssueCounts, Severity};
use crate::core_modules::manifest::{LABEL, LabelRecord, Manifest, ManifestRow};
use crate::error::QcError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Kpis {
    pub total_label_rows: usize,
    pub issues_total: usize,
    pub issues_open: usize,
    pub issues_resolved: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeverityCount {
    pub severity: Severity,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport<'a> {
    pub kpis: Kpis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_distribution: Option<Vec<LabelCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_severity: Option<Vec<SeverityCount>>,
    /// Manifest rows exactly as read, one object per row keyed by the header.
    pub labels: Vec<ManifestRow<'a>>,
    pub issues: &'a [Issue],
}

impl<'a> QualityReport<'a> {
    pub fn build(manifest: &'a Manifest, issues: &'a [Issue]) -> Self {
        let counts = IssueCounts::tally(issues);
        Self {
            kpis: Kpis {
                total_label_rows: manifest.len(),
                issues_total: counts.total,
                issues_open: counts.open,
                issues_resolved: counts.resolved,
            },
            label_distribution: manifest
                .has_column(LABEL)
                .then(|| label_distribution(manifest.records())),
            issue_severity: (!issues.is_empty()).then(|| severity_distribution(issues)),
            labels: manifest.rows().collect(),
            issues,
        }
    }

    /// Writes the report as pretty-printed JSON, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<(), QcError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| QcError::io(parent, source))?;
        }
        let file = File::create(path).map_err(|source| QcError::io(path, source))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| QcError::Report {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(|source| QcError::io(path, source))?;
        info!(path = %path.display(), issues = self.kpis.issues_total, "wrote quality report");
        Ok(())
    }
}

/// Counts per label, most frequent first; ties break alphabetically.
pub fn label_distribution(records: &[LabelRecord]) -> Vec<LabelCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        *counts.entry(record.label.as_str()).or_default() += 1;
    }
    let mut distribution: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount {
            label: label.to_string(),
            count,
        })
        .collect();
    distribution.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    distribution
}

/// Counts per severity, most frequent first; ties list the higher severity first.
pub fn severity_distribution(issues: &[Issue]) -> Vec<SeverityCount> {
    let mut counts: HashMap<Severity, usize> = HashMap::new();
    for issue in issues {
        *counts.entry(issue.severity).or_default() += 1;
    }
    let mut distribution: Vec<SeverityCount> = counts
        .into_iter()
        .map(|(severity, count)| SeverityCount { severity, count })
        .collect();
    distribution.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| b.severity.cmp(&a.severity)));
    distribution
}
