use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dataset_qc::{QcConfig, QualityPipeline};

#[derive(Debug, Parser)]
#[command(
    name = "dataset-qc",
    version,
    about = "Validate a labeled image dataset and track its issues"
)]
struct Cli {
    /// TOML configuration file (defaults to ./dataset_qc.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output.
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors.
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate, reconcile, and write issues, report, snapshot and audit row.
    Run(DatasetArgs),
    /// Validate and reconcile, then print the issues without writing anything.
    Check(DatasetArgs),
    /// Copy the raw-data directory into a new release snapshot.
    Snapshot,
}

#[derive(Debug, Args)]
struct DatasetArgs {
    /// Raw-data directory holding the images.
    #[arg(long)]
    raw_dir: Option<PathBuf>,

    /// Label manifest (defaults to <raw-dir>/labels.csv when --raw-dir is given).
    #[arg(long)]
    labels: Option<PathBuf>,
}

impl DatasetArgs {
    fn apply(&self, config: &mut QcConfig) {
        if let Some(raw_dir) = &self.raw_dir {
            config.paths.raw_dir = raw_dir.clone();
            config.paths.labels_csv = raw_dir.join("labels.csv");
        }
        if let Some(labels) = &self.labels {
            config.paths.labels_csv = labels.clone();
        }
    }
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let mut config =
        QcConfig::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    let show_progress = !cli.quiet;

    match &cli.command {
        Command::Run(args) => {
            args.apply(&mut config);
            let summary = QualityPipeline::new(config)
                .show_progress(show_progress)
                .run(chrono::Local::now())
                .context("pipeline run failed")?;

            println!("Pipeline complete");
            println!("- Issues CSV: {}", summary.issues_csv.display());
            println!("- Report: {}", summary.report_path.display());
            println!("- Release snapshot: {}", summary.release_path.display());
            println!("- Audit log: {}", summary.audit_log.display());
            println!(
                "- Issues: {} total, {} open, {} resolved",
                summary.counts.total, summary.counts.open, summary.counts.resolved
            );
        }
        Command::Check(args) => {
            args.apply(&mut config);
            let assessment = QualityPipeline::new(config)
                .show_progress(show_progress)
                .assess()
                .context("validation failed")?;

            for issue in &assessment.issues {
                println!(
                    "{:<6} {:<16} {:<24} {:<8} {}",
                    issue.severity, issue.issue_code, issue.image_id, issue.status, issue.message
                );
            }
            let counts = assessment.counts();
            println!(
                "{} label rows, {} issues ({} open, {} resolved)",
                assessment.manifest.len(),
                counts.total,
                counts.open,
                counts.resolved
            );
        }
        Command::Snapshot => {
            let path = QualityPipeline::new(config)
                .snapshot(chrono::Local::now())
                .context("snapshot failed")?;
            println!("Release snapshot: {}", path.display());
        }
    }

    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("DATASET_QC_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
