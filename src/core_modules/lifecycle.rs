// THEORY:
// The lifecycle manager lets a human-assigned status outlive the run that
// produced the issue. Detection is recomputed from scratch each run, so the
// previous run's persisted issue list is the only memory of triage decisions.
//
// Two responsibilities, kept apart:
// 1.  `reconcile` is a pure function of (fresh, previous). Statuses are copied
//     across by `(issue_code, image_id)` key; new keys stay `open`; keys that
//     no longer reproduce simply vanish. There is no tombstone: once a
//     condition stops being detected its issue and status leave the live list,
//     and only the audit log remembers it.
// 2.  `load_previous` / `save_issues` handle the CSV file at the pipeline
//     boundary: read before the run, overwrite after it.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;

use tracing::{debug, warn};

use crate::core_modules::issue::{Issue, IssueCode, IssueKey, IssueStatus, Severity};
use crate::error::QcError;

pub const ISSUE_COLUMNS: [&str; 5] = ["issue_code", "image_id", "severity", "message", "status"];

/// Carries statuses from `previous` onto `fresh` by issue key.
///
/// With no previous list the fresh issues are returned untouched. When the
/// previous list repeats a key, the last occurrence wins.
pub fn reconcile(fresh: Vec<Issue>, previous: Option<&[Issue]>) -> Vec<Issue> {
    let Some(previous) = previous else {
        return fresh;
    };

    let statuses: HashMap<IssueKey, &IssueStatus> = previous
        .iter()
        .map(|issue| (issue.key(), &issue.status))
        .collect();

    fresh
        .into_iter()
        .map(|mut issue| {
            issue.status = statuses
                .get(&issue.key())
                .map(|status| (*status).clone())
                .unwrap_or_default();
            issue
        })
        .collect()
}

/// Reads the persisted issue list.
///
/// Returns `None` when there is no usable prior state: the file is missing,
/// or it has no `status` column. Rows whose `issue_code` is not recognised
/// are skipped, since they can never match a fresh issue.
pub fn load_previous(path: &Path) -> Result<Option<Vec<Issue>>, QcError> {
    if !path.is_file() {
        debug!(path = %path.display(), "no persisted issue list");
        return Ok(None);
    }

    let file = File::open(path).map_err(|source| QcError::io(path, source))?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
    let headers = reader
        .headers()
        .map_err(|source| QcError::csv(path, source))?
        .clone();

    let column = |name: &str| headers.iter().position(|header| header == name);
    let Some(status_column) = column("status") else {
        debug!(path = %path.display(), "persisted issue list has no status column");
        return Ok(None);
    };
    let code_column = column("issue_code");
    let image_column = column("image_id");
    let severity_column = column("severity");
    let message_column = column("message");

    let mut issues = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|source| QcError::csv(path, source))?;
        let cell =
            |index: Option<usize>| index.and_then(|index| row.get(index)).unwrap_or_default();

        let issue_code: IssueCode = match cell(code_column).parse() {
            Ok(code) => code,
            Err(reason) => {
                warn!(path = %path.display(), row = line + 1, %reason, "skipping persisted issue");
                continue;
            }
        };
        let severity = match cell(severity_column) {
            "low" => Severity::Low,
            "medium" => Severity::Medium,
            "high" => Severity::High,
            _ => issue_code.severity(),
        };
        let status = match cell(Some(status_column)) {
            "" => IssueStatus::Open,
            other => IssueStatus::from(other),
        };

        issues.push(Issue {
            issue_code,
            image_id: cell(image_column).to_string(),
            severity,
            message: cell(message_column).to_string(),
            status,
        });
    }

    debug!(path = %path.display(), issues = issues.len(), "loaded persisted issue list");
    Ok(Some(issues))
}

/// Overwrites the persisted issue list with `issues`.
pub fn save_issues(path: &Path, issues: &[Issue]) -> Result<(), QcError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| QcError::io(parent, source))?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|source| QcError::csv(path, source))?;
    writer
        .write_record(ISSUE_COLUMNS)
        .map_err(|source| QcError::csv(path, source))?;
    for issue in issues {
        writer
            .serialize(issue)
            .map_err(|source| QcError::csv(path, source))?;
    }
    writer.flush().map_err(|source| QcError::io(path, source))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn issue(code: IssueCode, image_id: &str, status: &str) -> Issue {
        let mut issue = Issue::new(code, image_id, format!("{code} on {image_id}"));
        issue.status = IssueStatus::from(status);
        issue
    }

    #[test]
    fn absent_previous_state_leaves_everything_open() {
        let fresh = vec![issue(IssueCode::Blurry, "a.jpg", "open")];
        assert_eq!(reconcile(fresh.clone(), None), fresh);
    }

    #[test]
    fn matching_keys_carry_their_status() {
        let fresh = vec![
            Issue::new(IssueCode::FileMissing, "img1.jpg", "Image not found: data/raw/img1.jpg"),
            Issue::new(IssueCode::Blurry, "img2.jpg", "LaplacianVar=3.0 < 100"),
        ];
        let previous = vec![
            issue(IssueCode::FileMissing, "img1.jpg", "resolved"),
            issue(IssueCode::TooDark, "img2.jpg", "resolved"),
        ];

        let merged = reconcile(fresh, Some(&previous));
        assert_eq!(merged[0].status, IssueStatus::Resolved);
        assert_eq!(merged[1].status, IssueStatus::Open);
        assert_eq!(merged[0].message, "Image not found: data/raw/img1.jpg");
    }

    #[test]
    fn non_reproducing_issues_are_dropped() {
        let previous = vec![issue(IssueCode::Duplicate, "x.jpg", "resolved")];
        let merged = reconcile(Vec::new(), Some(&previous));
        assert!(merged.is_empty());
    }

    #[test]
    fn reconciliation_is_a_fixed_point() {
        let mut first = vec![
            Issue::new(IssueCode::Duplicate, "x.jpg", "Duplicate of w.jpg"),
            Issue::new(IssueCode::TooBright, "y.jpg", "MeanBrightness=250.0 > 210"),
        ];
        first[0].status = IssueStatus::Resolved;

        let fresh: Vec<Issue> = first
            .iter()
            .map(|issue| {
                Issue::new(issue.issue_code, issue.image_id.clone(), issue.message.clone())
            })
            .collect();
        assert_eq!(reconcile(fresh, Some(&first)), first);
        assert_eq!(reconcile(first.clone(), Some(&first)), first);
    }

    #[test]
    fn last_duplicate_key_wins() {
        let previous = vec![
            issue(IssueCode::Blurry, "a.jpg", "resolved"),
            issue(IssueCode::Blurry, "a.jpg", "wontfix"),
        ];
        let merged = reconcile(vec![Issue::new(IssueCode::Blurry, "a.jpg", "")], Some(&previous));
        assert_eq!(merged[0].status, IssueStatus::Other("wontfix".into()));
    }

    #[test]
    fn fresh_issues_are_never_merged() {
        let fresh = vec![
            Issue::new(IssueCode::MissingColumn, "", "manifest missing column 'notes'"),
            Issue::new(IssueCode::MissingColumn, "", "manifest missing column 'source'"),
        ];
        let previous = vec![issue(IssueCode::MissingColumn, "", "resolved")];
        let merged = reconcile(fresh, Some(&previous));
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(Issue::is_resolved));
    }

    #[test]
    fn persisted_list_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reports").join("issues.csv");
        let issues = vec![
            issue(IssueCode::FileMissing, "img1.jpg", "resolved"),
            issue(IssueCode::MissingColumn, "", "open"),
            issue(IssueCode::Blurry, "img, with comma.jpg", "needs review"),
        ];

        save_issues(&path, &issues).expect("save");
        let loaded = load_previous(&path).expect("load").expect("status column");
        assert_eq!(loaded, issues);

        let text = fs::read_to_string(&path).expect("read");
        assert!(text.starts_with("issue_code,image_id,severity,message,status\n"));
        assert!(text.contains("FILE_MISSING,img1.jpg,high,"));
    }

    #[test]
    fn empty_list_still_writes_a_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("issues.csv");
        save_issues(&path, &[]).expect("save");
        assert_eq!(load_previous(&path).expect("load"), Some(Vec::new()));
    }

    #[test]
    fn missing_file_means_no_prior_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(load_previous(&dir.path().join("issues.csv")).expect("load"), None);
    }

    #[test]
    fn file_without_status_column_means_no_prior_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("issues.csv");
        fs::write(&path, "issue_code,image_id\nBLURRY,a.jpg\n").expect("write");
        assert_eq!(load_previous(&path).expect("load"), None);
    }

    #[test]
    fn unknown_codes_are_skipped_and_blank_status_is_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("issues.csv");
        fs::write(
            &path,
            "issue_code,image_id,status\nRETIRED_CHECK,a.jpg,resolved\nTOO_DARK,b.jpg,\n",
        )
        .expect("write");

        let loaded = load_previous(&path).expect("load").expect("status column");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].issue_code, IssueCode::TooDark);
        assert_eq!(loaded[0].severity, Severity::Low);
        assert_eq!(loaded[0].status, IssueStatus::Open);
    }
}
