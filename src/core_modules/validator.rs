// THEORY:
// The `Validator` is the rule engine of a run. Given a manifest and the raw-data
// directory, it produces the complete, unordered set of `Issue`s for that run.
//
// Key architectural principles:
// 1.  **Failures are data**: no check raises. Each check returns zero or more
//     `Issue`s and the engine simply accumulates them. One unreadable image never
//     stops the others from being inspected.
// 2.  **Three tiers**: the schema tier runs once over the header; the row tier
//     runs once per record (identifier, file presence, label, consent); the
//     image tier runs once per record whose file exists (decode, resolution,
//     blur, exposure, duplication). Tiers are independent, so a record can
//     collect issues from all of them.
// 3.  **Run-scoped duplicate memory**: a `FingerprintRegistry` maps each content
//     fingerprint to the first `image_id` that produced it in manifest order.
//     It is created by `validate`, threaded through the image tier, and dropped
//     when the run ends. Nothing about duplicates persists between runs.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::config::QualityThresholds;
use crate::core_modules::image_quality::{
    Fingerprint, ImageAnalyzer, ImageMetrics, PerceptualAnalyzer,
};
use crate::core_modules::issue::{Issue, IssueCode};
use crate::core_modules::manifest::{IMAGE_ID, LabelRecord, Manifest};
use crate::error::QcError;

/// First-seen owner of each fingerprint within one run.
#[derive(Debug, Default)]
pub struct FingerprintRegistry {
    first_seen: HashMap<Fingerprint, String>,
}

impl FingerprintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `image_id` as the owner of `fingerprint` unless one already
    /// exists, in which case the earlier owner is returned.
    pub fn claim(&mut self, fingerprint: Fingerprint, image_id: &str) -> Option<String> {
        match self.first_seen.entry(fingerprint) {
            Entry::Occupied(owner) => Some(owner.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(image_id.to_string());
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.first_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_seen.is_empty()
    }
}

/// Emits one `MISSING_COLUMN` issue per required column absent from the header.
pub fn schema_issues(manifest: &Manifest) -> Vec<Issue> {
    manifest
        .missing_columns()
        .into_iter()
        .map(|column| {
            Issue::new(
                IssueCode::MissingColumn,
                "",
                format!("manifest missing column '{column}'"),
            )
        })
        .collect()
}

/// Row-tier checks for one record.
pub fn record_issues(
    record: &LabelRecord,
    raw_dir: &Path,
    thresholds: &QualityThresholds,
) -> Vec<Issue> {
    let image_id = record.image_id.trim();
    if image_id.is_empty() {
        return vec![Issue::new(
            IssueCode::MissingImageId,
            "",
            "Empty image_id in manifest",
        )];
    }

    let mut issues = Vec::new();

    let path = raw_dir.join(image_id);
    if !path.is_file() {
        issues.push(Issue::new(
            IssueCode::FileMissing,
            image_id,
            format!("Image not found: {}", path.display()),
        ));
    }

    let label = record.label.trim();
    if !thresholds.is_allowed_label(label) {
        issues.push(Issue::new(
            IssueCode::InvalidLabel,
            image_id,
            format!("Label '{label}' not in allowed list"),
        ));
    }

    let consent = record.consent.trim().to_lowercase();
    if consent != "yes" {
        issues.push(Issue::new(
            IssueCode::ConsentNotYes,
            image_id,
            format!("Consent is '{consent}' (expected 'yes')"),
        ));
    }

    issues
}

pub fn check_resolution(
    image_id: &str,
    metrics: &ImageMetrics,
    thresholds: &QualityThresholds,
) -> Option<Issue> {
    (metrics.width < thresholds.min_width || metrics.height < thresholds.min_height).then(|| {
        Issue::new(
            IssueCode::LowResolution,
            image_id,
            format!(
                "{}x{} below {}x{}",
                metrics.width, metrics.height, thresholds.min_width, thresholds.min_height
            ),
        )
    })
}

pub fn check_blur(
    image_id: &str,
    metrics: &ImageMetrics,
    thresholds: &QualityThresholds,
) -> Option<Issue> {
    (metrics.blur_score < thresholds.blur_laplacian_var_min).then(|| {
        Issue::new(
            IssueCode::Blurry,
            image_id,
            format!(
                "LaplacianVar={:.1} < {}",
                metrics.blur_score, thresholds.blur_laplacian_var_min
            ),
        )
    })
}

/// Dark is checked before bright; the band bounds themselves pass.
pub fn check_brightness(
    image_id: &str,
    metrics: &ImageMetrics,
    thresholds: &QualityThresholds,
) -> Option<Issue> {
    let brightness = metrics.mean_brightness;
    if brightness < thresholds.mean_brightness_min {
        Some(Issue::new(
            IssueCode::TooDark,
            image_id,
            format!(
                "MeanBrightness={brightness:.1} < {}",
                thresholds.mean_brightness_min
            ),
        ))
    } else if brightness > thresholds.mean_brightness_max {
        Some(Issue::new(
            IssueCode::TooBright,
            image_id,
            format!(
                "MeanBrightness={brightness:.1} > {}",
                thresholds.mean_brightness_max
            ),
        ))
    } else {
        None
    }
}

/// The validation engine for one run.
pub struct Validator<A: ImageAnalyzer = PerceptualAnalyzer> {
    thresholds: QualityThresholds,
    analyzer: A,
    show_progress: bool,
}

impl Validator<PerceptualAnalyzer> {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self::with_analyzer(thresholds, PerceptualAnalyzer)
    }
}

impl<A: ImageAnalyzer> Validator<A> {
    pub fn with_analyzer(thresholds: QualityThresholds, analyzer: A) -> Self {
        Self {
            thresholds,
            analyzer,
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr during the image tier.
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// Loads the manifest and validates it. Fails only when the manifest is missing
    /// or unreadable.
    pub fn validate_dataset(
        &self,
        labels_csv: &Path,
        raw_dir: &Path,
    ) -> Result<(Manifest, Vec<Issue>), QcError> {
        let manifest = Manifest::load(labels_csv)?;
        let issues = self.validate(&manifest, raw_dir);
        Ok((manifest, issues))
    }

    /// Computes every issue for `manifest` against the files under `raw_dir`.
    pub fn validate(&self, manifest: &Manifest, raw_dir: &Path) -> Vec<Issue> {
        let mut issues = schema_issues(manifest);

        if !manifest.has_column(IMAGE_ID) {
            info!(
                schema_issues = issues.len(),
                "manifest has no image_id column; skipping row and image checks"
            );
            return issues;
        }

        for record in manifest.records() {
            issues.extend(record_issues(record, raw_dir, &self.thresholds));
        }

        let candidates: Vec<(&str, PathBuf)> = manifest
            .records()
            .iter()
            .map(|record| record.image_id.trim())
            .filter(|image_id| !image_id.is_empty())
            .map(|image_id| (image_id, raw_dir.join(image_id)))
            .filter(|(_, path)| path.is_file())
            .collect();

        let progress = self.progress_bar(candidates.len() as u64);
        let mut registry = FingerprintRegistry::new();
        for (image_id, path) in &candidates {
            issues.extend(self.image_issues(image_id, path, &mut registry));
            progress.inc(1);
        }
        progress.finish_and_clear();

        info!(
            records = manifest.len(),
            images = candidates.len(),
            fingerprints = registry.len(),
            issues = issues.len(),
            "validation complete"
        );
        issues
    }

    /// Image-tier checks for one existing file.
    pub fn image_issues(
        &self,
        image_id: &str,
        path: &Path,
        registry: &mut FingerprintRegistry,
    ) -> Vec<Issue> {
        let buffer = match self.analyzer.read(path) {
            Ok(buffer) => buffer,
            Err(error) => {
                debug!(image_id, %error, "image could not be decoded");
                return vec![Issue::new(
                    IssueCode::CorruptImage,
                    image_id,
                    format!("Cannot decode image: {error}"),
                )];
            }
        };

        let metrics = ImageMetrics::measure(&buffer);
        debug!(
            image_id,
            width = metrics.width,
            height = metrics.height,
            blur_score = metrics.blur_score,
            mean_brightness = metrics.mean_brightness,
            "measured image"
        );

        let mut issues: Vec<Issue> = [
            check_resolution(image_id, &metrics, &self.thresholds),
            check_blur(image_id, &metrics, &self.thresholds),
            check_brightness(image_id, &metrics, &self.thresholds),
        ]
        .into_iter()
        .flatten()
        .collect();

        match self.analyzer.fingerprint(path, &buffer) {
            Ok(fingerprint) => {
                if let Some(first) = registry.claim(fingerprint, image_id) {
                    issues.push(Issue::new(
                        IssueCode::Duplicate,
                        image_id,
                        format!("Duplicate of {first} (pHash={fingerprint})"),
                    ));
                }
            }
            Err(error) => issues.push(Issue::new(
                IssueCode::HashFailed,
                image_id,
                format!("pHash failed: {error}"),
            )),
        }

        issues
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template("{wide_bar:.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message("Validating images");
        bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::image_quality::{AnalyzerError, PixelBuffer};
    use pretty_assertions::assert_eq;

    fn metrics(width: u32, height: u32, blur_score: f64, mean_brightness: f64) -> ImageMetrics {
        ImageMetrics {
            width,
            height,
            blur_score,
            mean_brightness,
        }
    }

    fn record(image_id: &str, label: &str, consent: &str) -> LabelRecord {
        LabelRecord {
            image_id: image_id.into(),
            label: label.into(),
            consent: consent.into(),
            ..LabelRecord::default()
        }
    }

    fn codes(issues: &[Issue]) -> Vec<IssueCode> {
        issues.iter().map(|issue| issue.issue_code).collect()
    }

    /// Analyzer that serves a sharp, well-exposed 640x480 buffer for every path
    /// and fingerprints from a fixed table.
    struct ScriptedAnalyzer {
        fingerprints: HashMap<PathBuf, Result<u64, String>>,
    }

    impl ScriptedAnalyzer {
        fn new(entries: &[(&Path, Result<u64, &str>)]) -> Self {
            let fingerprints = entries
                .iter()
                .map(|(path, result)| (path.to_path_buf(), result.map_err(String::from)))
                .collect();
            Self { fingerprints }
        }
    }

    impl ImageAnalyzer for ScriptedAnalyzer {
        fn read(&self, _path: &Path) -> Result<PixelBuffer, AnalyzerError> {
            let (width, height) = (640u32, 480u32);
            let gray = (0..height)
                .flat_map(|y| (0..width).map(move |x| if (x + y) % 2 == 0 { 60 } else { 190 }))
                .collect();
            Ok(PixelBuffer::from_gray(width, height, gray).expect("plane matches"))
        }

        fn fingerprint(
            &self,
            path: &Path,
            _buffer: &PixelBuffer,
        ) -> Result<Fingerprint, AnalyzerError> {
            match self.fingerprints.get(path) {
                Some(Ok(bits)) => Ok(Fingerprint(*bits)),
                Some(Err(reason)) => Err(AnalyzerError::Fingerprint {
                    reason: reason.clone(),
                }),
                None => Err(AnalyzerError::Fingerprint {
                    reason: "unscripted".into(),
                }),
            }
        }
    }

    #[test]
    fn registry_keeps_the_first_owner() {
        let mut registry = FingerprintRegistry::new();
        assert_eq!(registry.claim(Fingerprint(1), "a.jpg"), None);
        assert_eq!(registry.claim(Fingerprint(1), "b.jpg"), Some("a.jpg".into()));
        assert_eq!(registry.claim(Fingerprint(1), "c.jpg"), Some("a.jpg".into()));
        assert_eq!(registry.claim(Fingerprint(2), "c.jpg"), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn brightness_band_bounds_are_inclusive() {
        let thresholds = QualityThresholds::default();
        assert_eq!(check_brightness("a", &metrics(640, 480, 500.0, 40.0), &thresholds), None);
        assert_eq!(check_brightness("a", &metrics(640, 480, 500.0, 210.0), &thresholds), None);

        let dark = check_brightness("a", &metrics(640, 480, 500.0, 39.9), &thresholds);
        assert_eq!(dark.map(|issue| issue.issue_code), Some(IssueCode::TooDark));

        let bright = check_brightness("a", &metrics(640, 480, 500.0, 210.1), &thresholds);
        assert_eq!(bright.map(|issue| issue.issue_code), Some(IssueCode::TooBright));
    }

    #[test]
    fn resolution_fails_on_either_axis() {
        let thresholds = QualityThresholds::default();
        assert!(check_resolution("a", &metrics(320, 240, 0.0, 0.0), &thresholds).is_none());
        assert!(check_resolution("a", &metrics(319, 480, 0.0, 0.0), &thresholds).is_some());
        assert!(check_resolution("a", &metrics(640, 239, 0.0, 0.0), &thresholds).is_some());
    }

    #[test]
    fn blur_threshold_is_strict() {
        let thresholds = QualityThresholds::default();
        assert!(check_blur("a", &metrics(640, 480, 100.0, 0.0), &thresholds).is_none());
        let issue = check_blur("a", &metrics(640, 480, 12.34, 0.0), &thresholds).expect("blurry");
        assert_eq!(issue.message, "LaplacianVar=12.3 < 100");
    }

    #[test]
    fn blank_image_id_short_circuits_the_row() {
        let dir = tempfile::tempdir().expect("tempdir");
        let issues = record_issues(
            &record("   ", "not-a-label", "no"),
            dir.path(),
            &QualityThresholds::default(),
        );
        assert_eq!(codes(&issues), vec![IssueCode::MissingImageId]);
        assert_eq!(issues[0].image_id, "");
    }

    #[test]
    fn row_checks_trim_and_normalize() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.jpg"), b"x").expect("write");

        let issues = record_issues(
            &record(" a.jpg ", " fist ", " YeS "),
            dir.path(),
            &QualityThresholds::default(),
        );
        assert!(issues.is_empty());
    }

    #[test]
    fn row_checks_accumulate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let issues = record_issues(
            &record("gone.jpg", "wave", "pending"),
            dir.path(),
            &QualityThresholds::default(),
        );
        assert_eq!(
            codes(&issues),
            vec![
                IssueCode::FileMissing,
                IssueCode::InvalidLabel,
                IssueCode::ConsentNotYes
            ]
        );
        assert!(issues.iter().all(|issue| issue.image_id == "gone.jpg"));
        assert_eq!(issues[2].message, "Consent is 'pending' (expected 'yes')");
    }

    #[test]
    fn directories_do_not_count_as_image_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("nested")).expect("mkdir");
        let issues = record_issues(
            &record("nested", "fist", "yes"),
            dir.path(),
            &QualityThresholds::default(),
        );
        assert_eq!(codes(&issues), vec![IssueCode::FileMissing]);
    }

    #[test]
    fn missing_image_id_column_yields_schema_issues_only() {
        let manifest = Manifest::from_reader("label,consent\nfist,yes\n".as_bytes()).expect("csv");
        let dir = tempfile::tempdir().expect("tempdir");
        let issues = Validator::new(QualityThresholds::default()).validate(&manifest, dir.path());

        assert_eq!(issues.len(), 4);
        assert!(issues.iter().all(|issue| issue.issue_code == IssueCode::MissingColumn));
        assert!(issues.iter().all(|issue| issue.image_id.is_empty()));
        assert_eq!(issues[0].message, "manifest missing column 'image_id'");
    }

    #[test]
    fn duplicates_reference_the_first_seen_image_in_manifest_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            std::fs::write(dir.path().join(name), b"x").expect("write");
        }
        let (a, b, c) = (
            dir.path().join("a.jpg"),
            dir.path().join("b.jpg"),
            dir.path().join("c.jpg"),
        );
        let analyzer = ScriptedAnalyzer::new(&[
            (a.as_path(), Ok(0xa)),
            (b.as_path(), Ok(0xb)),
            (c.as_path(), Ok(0xb)),
        ]);
        let manifest = Manifest::from_reader(
            "image_id,label,consent\na.jpg,fist,yes\nb.jpg,fist,yes\nc.jpg,fist,yes\n".as_bytes(),
        )
        .expect("csv");

        let issues = Validator::with_analyzer(QualityThresholds::default(), analyzer)
            .validate(&manifest, dir.path());
        let duplicates: Vec<&Issue> = issues
            .iter()
            .filter(|issue| issue.issue_code == IssueCode::Duplicate)
            .collect();

        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].image_id, "c.jpg");
        assert_eq!(
            duplicates[0].message,
            "Duplicate of b.jpg (pHash=000000000000000b)"
        );
    }

    #[test]
    fn hash_failure_is_recorded_and_does_not_stop_the_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["a.jpg", "b.jpg"] {
            std::fs::write(dir.path().join(name), b"x").expect("write");
        }
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        let analyzer =
            ScriptedAnalyzer::new(&[(a.as_path(), Err("unsupported")), (b.as_path(), Ok(1))]);
        let manifest = Manifest::new(
            crate::core_modules::manifest::REQUIRED_COLUMNS
                .iter()
                .map(|column| column.to_string())
                .collect(),
            vec![
                vec!["a.jpg".into(), "fist".into(), "webcam".into(), String::new(), "yes".into()],
                vec!["b.jpg".into(), "fist".into(), "webcam".into(), String::new(), "yes".into()],
            ],
        );

        let issues = Validator::with_analyzer(QualityThresholds::default(), analyzer)
            .validate(&manifest, dir.path());

        assert_eq!(codes(&issues), vec![IssueCode::HashFailed]);
        assert_eq!(issues[0].image_id, "a.jpg");
        assert_eq!(
            issues[0].message,
            "pHash failed: cannot fingerprint image: unsupported"
        );
    }
}
