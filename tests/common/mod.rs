//! Fixture helpers shared by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use dataset_qc::{PathsConfig, QcConfig};
use image::{GrayImage, Luma};
use tempfile::TempDir;

pub const HEADER: &str = "image_id,label,source,collected_at,consent,notes";

/// A throwaway dataset: `raw/` for images and the manifest, siblings for outputs.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("raw")).expect("raw dir");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn raw(&self) -> PathBuf {
        self.root().join("raw")
    }

    pub fn config(&self) -> QcConfig {
        QcConfig {
            paths: PathsConfig {
                raw_dir: self.raw(),
                labels_csv: self.raw().join("labels.csv"),
                issues_csv: self.root().join("reports").join("issues.csv"),
                report_path: self.root().join("reports").join("quality_report.json"),
                releases_dir: self.root().join("releases"),
                audit_log: self.root().join("logs").join("audit_log.csv"),
            },
            ..QcConfig::default()
        }
    }

    /// Writes a manifest with the full header and one `image_id,label,consent` row per entry.
    pub fn manifest(&self, rows: &[(&str, &str, &str)]) {
        let mut text = format!("{HEADER}\n");
        for (image_id, label, consent) in rows {
            text.push_str(&format!(
                "{image_id},{label},webcam,2024-01-01T10:00:00,{consent},\n"
            ));
        }
        fs::write(self.raw().join("labels.csv"), text).expect("manifest");
    }

    pub fn image(&self, name: &str, image: &GrayImage) {
        image.save(self.raw().join(name)).expect("save image");
    }

    pub fn file(&self, name: &str, bytes: &[u8]) {
        fs::write(self.raw().join(name), bytes).expect("write file");
    }
}

pub fn uniform(width: u32, height: u32, value: u8) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([value]))
}

/// Sharp, mid-grey, large enough to pass every image check.
pub fn clean_image() -> GrayImage {
    GrayImage::from_fn(640, 480, |x, y| {
        Luma([if (x / 2 + y / 2) % 2 == 0 { 70 } else { 180 }])
    })
}

/// 8x8 grid of cells filled from a linear congruential sequence; distinct
/// seeds give visually distinct images.
pub fn blocky_noise(seed: u32, size: u32) -> GrayImage {
    let mut state = seed;
    let mut cells = [0u8; 64];
    for cell in cells.iter_mut() {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        *cell = (state >> 16) as u8;
    }
    let cell_size = size / 8;
    GrayImage::from_fn(size, size, |x, y| {
        let column = (x / cell_size).min(7);
        let row = (y / cell_size).min(7);
        Luma([cells[(row * 8 + column) as usize]])
    })
}
