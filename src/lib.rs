// THEORY:
// This file is the main entry point for the `dataset_qc` library crate.
// It exposes the `QualityPipeline` (one complete validation run) and the
// configuration it is driven by. The component modules under `core_modules`
// are public so each stage can be exercised on its own: the image analyzer,
// the validation engine, the issue lifecycle manager, and the three output
// collaborators (report, snapshot, audit).

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use config::{PathsConfig, QcConfig, QualityThresholds};
pub use error::{ConfigError, QcError};
pub use pipeline::{QualityPipeline, RunSummary};
