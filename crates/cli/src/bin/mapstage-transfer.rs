//! mapstage-transfer - move files or whole directories between the local
//! filesystem and the object store.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::error;

use mapstage_cli::logging::{self, LogFormat};
use mapstage_cli::settings;
use mapstage_cli::transfer::{self, Direction, TransferRequest};
use mapstage_core::Transfer;

#[derive(Parser)]
#[command(name = "mapstage-transfer", version, about = "Object store transfers")]
struct Cli {
    /// Transfer direction
    #[arg(long, value_enum)]
    operation: Direction,

    /// Key prefix in the bucket
    #[arg(long, alias = "s3-path")]
    remote_path: String,

    /// Local directory
    #[arg(long)]
    local_path: PathBuf,

    /// Transfer only this file instead of the whole directory
    #[arg(long)]
    filename: Option<String>,

    /// Create the target folder first (marker object for directory uploads,
    /// local directory for downloads)
    #[arg(long)]
    create_dirs: bool,

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
    let store = settings::build_store(&config, true)?.context("Object store is required")?;

    let request = TransferRequest {
        direction: cli.operation,
        remote_path: cli.remote_path,
        local_path: cli.local_path,
        filename: cli.filename,
        create_dirs: cli.create_dirs,
    };
    transfer::run(&Transfer::new(store), &request).await?;
    Ok(())
}
