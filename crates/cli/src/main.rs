//! mapstage - routing-dataset pipeline driver.
//!
//! Runs one operation (fetch, a single processing stage, the complete
//! pipeline, a cleanup or a server-data download) and exits non-zero when it
//! fails.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use mapstage_cli::logging::{self, LogFormat};
use mapstage_cli::settings::{self, ProfileArg, StorageArg};
use mapstage_cli::Orchestrator;
use mapstage_core::{
    metrics, Cancellation, ComposeRunner, DataLayout, HttpFetcher, StepKind, StorageMode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Operation {
    Download,
    Extract,
    Partition,
    Customize,
    #[value(alias = "complete_pipeline")]
    CompletePipeline,
    Cleanup,
    #[value(alias = "download_server_data")]
    DownloadServerData,
}

impl Operation {
    fn stage(self) -> Option<StepKind> {
        match self {
            Operation::Extract => Some(StepKind::Extract),
            Operation::Partition => Some(StepKind::Partition),
            Operation::Customize => Some(StepKind::Customize),
            _ => None,
        }
    }
}

#[derive(Parser)]
#[command(name = "mapstage", version, about = "Routing dataset pipeline")]
struct Cli {
    /// Operation to perform
    #[arg(long, value_enum, default_value = "download")]
    operation: Operation,

    /// Where raw and processed artifacts live
    #[arg(long, value_enum, default_value = "local")]
    storage: StorageArg,

    /// Routing profile passed to the processing containers (default car)
    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,

    /// Per-stage timeout in seconds, overriding the configured values
    #[arg(long)]
    timeout: Option<u64>,

    /// Remove local data files after the operation succeeds
    #[arg(short = 'c', long)]
    clean_up: bool,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the pipeline report or stage result as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write Prometheus metrics in text format when finished
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_format);

    let result = run(&cli).await;

    if let Some(ref path) = cli.metrics_file {
        if let Err(e) = write_metrics(path) {
            warn!("Failed to write metrics to {}: {:#}", path.display(), e);
        }
    }

    if let Err(e) = result {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let mut config = settings::load(cli.config.as_deref())?;
    if let Some(profile) = cli.profile {
        config.runner.profile = profile.into();
    }

    let mode = StorageMode::from(cli.storage);
    let store = settings::build_store(
        &config,
        mode.is_remote() || cli.operation == Operation::DownloadServerData,
    )?;

    let fetcher = HttpFetcher::new(
        config.dataset.clone(),
        DataLayout::new(&config.layout).raw_dir(),
        config.remote.raw_prefix.clone(),
        store.clone(),
    )?;
    let runner = ComposeRunner::new(config.runner.clone());

    info!(
        operation = ?cli.operation,
        mode = %mode,
        profile = %config.runner.profile,
        "Starting"
    );

    let cancel = Cancellation::new();
    settings::cancel_on_interrupt(cancel.clone());

    let orchestrator: Orchestrator =
        Orchestrator::new(config, mode, store, fetcher, runner)
            .with_cancellation(cancel)
            .with_timeout_override(cli.timeout.map(Duration::from_secs));

    execute(cli, &orchestrator).await?;

    if cli.clean_up && cli.operation != Operation::Cleanup {
        let report = orchestrator.cleanup_local_data().await;
        if !report.success() {
            warn!("Cleanup finished with {} errors", report.errors.len());
        }
    }

    info!("Operation {:?} completed", cli.operation);
    Ok(())
}

async fn execute(cli: &Cli, orchestrator: &Orchestrator) -> Result<()> {
    if let Some(step) = cli.operation.stage() {
        let result = orchestrator.run_stage(step).await?;
        info!(
            "Stage {} finished in {:.1}s",
            step,
            result.duration_ms as f64 / 1000.0
        );
        return write_report(cli.report.as_deref(), &result);
    }

    match cli.operation {
        Operation::Download => {
            let artifact = orchestrator.download().await?;
            write_report(cli.report.as_deref(), &artifact)
        }
        Operation::CompletePipeline => {
            let report = orchestrator.run_complete().await;
            write_report(cli.report.as_deref(), &report)?;
            if !report.succeeded() {
                bail!(
                    "Pipeline failed: {}",
                    report.failure_reason.as_deref().unwrap_or("unknown error")
                );
            }
            Ok(())
        }
        Operation::Cleanup => {
            let report = orchestrator.cleanup_local_data().await;
            if !report.success() {
                bail!("Cleanup finished with {} errors", report.errors.len());
            }
            Ok(())
        }
        Operation::DownloadServerData => {
            let report = orchestrator.download_server_data().await?;
            write_report(cli.report.as_deref(), &report)
        }
        Operation::Extract | Operation::Partition | Operation::Customize => Ok(()),
    }
}

fn write_report<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    info!("Report written to {}", path.display());
    Ok(())
}

fn write_metrics(path: &Path) -> Result<()> {
    let text = metrics::encode_metrics()?;
    std::fs::write(path, text)?;
    Ok(())
}
