// THEORY:
// An `Issue` is a value object describing one detected data-quality defect.
// Issues are recomputed from scratch on every run, so they carry no identity of
// their own beyond the pair `(issue_code, image_id)`: two issues with the same
// key are "the same issue" across runs even if the diagnostic message differs.
// The only state that survives between runs is the human-assigned `status`,
// carried forward by the lifecycle manager.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every defect the validator knows how to detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    MissingColumn,
    MissingImageId,
    FileMissing,
    InvalidLabel,
    ConsentNotYes,
    CorruptImage,
    LowResolution,
    Blurry,
    TooDark,
    TooBright,
    Duplicate,
    HashFailed,
}

impl IssueCode {
    pub const ALL: [IssueCode; 12] = [
        IssueCode::MissingColumn,
        IssueCode::MissingImageId,
        IssueCode::FileMissing,
        IssueCode::InvalidLabel,
        IssueCode::ConsentNotYes,
        IssueCode::CorruptImage,
        IssueCode::LowResolution,
        IssueCode::Blurry,
        IssueCode::TooDark,
        IssueCode::TooBright,
        IssueCode::Duplicate,
        IssueCode::HashFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::MissingColumn => "MISSING_COLUMN",
            IssueCode::MissingImageId => "MISSING_IMAGE_ID",
            IssueCode::FileMissing => "FILE_MISSING",
            IssueCode::InvalidLabel => "INVALID_LABEL",
            IssueCode::ConsentNotYes => "CONSENT_NOT_YES",
            IssueCode::CorruptImage => "CORRUPT_IMAGE",
            IssueCode::LowResolution => "LOW_RESOLUTION",
            IssueCode::Blurry => "BLURRY",
            IssueCode::TooDark => "TOO_DARK",
            IssueCode::TooBright => "TOO_BRIGHT",
            IssueCode::Duplicate => "DUPLICATE",
            IssueCode::HashFailed => "HASH_FAILED",
        }
    }

    /// The fixed severity attached to each code.
    pub fn severity(&self) -> Severity {
        match self {
            IssueCode::MissingColumn
            | IssueCode::MissingImageId
            | IssueCode::FileMissing
            | IssueCode::InvalidLabel
            | IssueCode::ConsentNotYes
            | IssueCode::CorruptImage => Severity::High,
            IssueCode::LowResolution | IssueCode::Blurry | IssueCode::Duplicate => {
                Severity::Medium
            }
            IssueCode::TooDark | IssueCode::TooBright | IssueCode::HashFailed => Severity::Low,
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for IssueCode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        IssueCode::ALL
            .into_iter()
            .find(|code| code.as_str() == value)
            .ok_or_else(|| format!("unknown issue code '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Triage state. Anything other than `open`/`resolved` written by a human
/// into the persisted list is carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IssueStatus {
    #[default]
    Open,
    Resolved,
    Other(String),
}

impl IssueStatus {
    pub fn as_str(&self) -> &str {
        match self {
            IssueStatus::Open => "open",
            IssueStatus::Resolved => "resolved",
            IssueStatus::Other(value) => value,
        }
    }
}

impl From<String> for IssueStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "open" => IssueStatus::Open,
            "resolved" => IssueStatus::Resolved,
            _ => IssueStatus::Other(value),
        }
    }
}

impl From<&str> for IssueStatus {
    fn from(value: &str) -> Self {
        IssueStatus::from(value.to_string())
    }
}

impl From<IssueStatus> for String {
    fn from(status: IssueStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Identity of an issue across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IssueKey {
    pub issue_code: IssueCode,
    pub image_id: String,
}

/// One detected problem. Field order matches the persisted CSV columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub issue_code: IssueCode,
    #[serde(default)]
    pub image_id: String,
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: IssueStatus,
}

impl Issue {
    /// A freshly detected issue: severity from the code, status `open`.
    pub fn new(
        issue_code: IssueCode,
        image_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            issue_code,
            image_id: image_id.into(),
            severity: issue_code.severity(),
            message: message.into(),
            status: IssueStatus::Open,
        }
    }

    pub fn key(&self) -> IssueKey {
        IssueKey {
            issue_code: self.issue_code,
            image_id: self.image_id.clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == IssueStatus::Open
    }

    pub fn is_resolved(&self) -> bool {
        self.status == IssueStatus::Resolved
    }
}

/// Open/resolved tallies over a reconciled issue list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssueCounts {
    pub total: usize,
    pub open: usize,
    pub resolved: usize,
}

impl IssueCounts {
    pub fn tally(issues: &[Issue]) -> Self {
        Self {
            total: issues.len(),
            open: issues.iter().filter(|issue| issue.is_open()).count(),
            resolved: issues.iter().filter(|issue| issue.is_resolved()).count(),
        }
    }
}
