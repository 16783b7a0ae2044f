// THEORY:
// A release snapshot freezes the raw-data directory as it was at the moment of a
// run. Each snapshot is a plain recursive copy named after the run's timestamp
// (`release_YYYYmmdd_HHMMSS`). Snapshots are never reused, mutated or removed
// here; two runs in the same second are assumed not to happen.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::info;
use walkdir::WalkDir;

use crate::error::QcError;

const RELEASE_PREFIX: &str = "release_";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// The directory name a snapshot taken at `at` receives.
pub fn release_name(at: NaiveDateTime) -> String {
    format!("{RELEASE_PREFIX}{}", at.format(STAMP_FORMAT))
}

/// Copies the tree under `src_dir` into a new timestamped folder inside
/// `releases_dir` and returns that folder's path.
pub fn create_release(
    src_dir: &Path,
    releases_dir: &Path,
    at: NaiveDateTime,
) -> Result<PathBuf, QcError> {
    let release_path = releases_dir.join(release_name(at));
    fs::create_dir_all(&release_path).map_err(|source| QcError::io(&release_path, source))?;

    let mut files = 0usize;
    for entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| QcError::Walk {
            path: src_dir.to_path_buf(),
            source,
        })?;
        let relative = entry
            .path()
            .strip_prefix(src_dir)
            .map_err(|_| {
                QcError::io(
                    entry.path(),
                    std::io::Error::other("entry escaped the source directory"),
                )
            })?;
        let target = release_path.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|source| QcError::io(&target, source))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|source| QcError::io(entry.path(), source))?;
            files += 1;
        }
    }

    info!(path = %release_path.display(), files, "created release snapshot");
    Ok(release_path)
}
