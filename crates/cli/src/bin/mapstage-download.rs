//! mapstage-download - fetch the configured dataset into local or remote
//! storage without running any processing stage.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use mapstage_cli::logging::{self, LogFormat};
use mapstage_cli::settings::{self, StorageArg};
use mapstage_core::{ArtifactLocation, DataLayout, Fetcher, HttpFetcher, StorageMode};

#[derive(Parser)]
#[command(name = "mapstage-download", version, about = "Download the raw dataset")]
struct Cli {
    /// Keep the file locally or upload it to the object store
    #[arg(long, value_enum, default_value = "local")]
    storage: StorageArg,

    /// Key prefix for remote uploads (defaults to the configured raw prefix)
    #[arg(long)]
    remote_prefix: Option<String>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

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

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = settings::load(cli.config.as_deref())?;
    let mode = StorageMode::from(cli.storage);
    let store = settings::build_store(&config, mode.is_remote())?;

    let layout = DataLayout::new(&config.layout);
    let raw_prefix = cli
        .remote_prefix
        .unwrap_or_else(|| config.remote.raw_prefix.clone());

    let fetcher = HttpFetcher::new(config.dataset.clone(), layout.raw_dir(), raw_prefix, store)?;
    let artifact = fetcher.fetch(mode).await?;

    let location = match artifact.location {
        ArtifactLocation::Local { ref path } => path.display().to_string(),
        ArtifactLocation::Remote { ref bucket, ref key } => format!("s3://{}/{}", bucket, key),
    };
    info!(
        "Dataset {} available at {} ({} bytes)",
        artifact.filename, location, artifact.size_bytes
    );
    Ok(())
}
