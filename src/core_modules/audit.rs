// THEORY:
// The audit log is the long-term memory of the pipeline: one row per completed
// run, appended and never rewritten. It is where resolved-and-vanished issues
// are still accounted for, as counts, after the live issue list forgets them.

use std::fs::{self, OpenOptions};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::QcError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO-8601 local time, second precision.
    pub timestamp: String,
    pub release_path: String,
    pub label_rows: usize,
    pub issues_total: usize,
    pub issues_open: usize,
    pub issues_resolved: usize,
}

/// Appends `entry` to the log at `path`, writing a header only when the file is new.
pub fn append(path: &Path, entry: &AuditEntry) -> Result<(), QcError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| QcError::io(parent, source))?;
    }

    let is_new = fs::metadata(path).map(|meta| meta.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| QcError::io(path, source))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);
    writer
        .serialize(entry)
        .map_err(|source| QcError::csv(path, source))?;
    writer.flush().map_err(|source| QcError::io(path, source))?;

    info!(path = %path.display(), timestamp = %entry.timestamp, "appended audit entry");
    Ok(())
}

/// Reads every entry back, oldest first.
pub fn read_all(path: &Path) -> Result<Vec<AuditEntry>, QcError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| QcError::csv(path, source))?;
    reader
        .deserialize()
        .collect::<Result<Vec<AuditEntry>, _>>()
        .map_err(|source| QcError::csv(path, source))
}
