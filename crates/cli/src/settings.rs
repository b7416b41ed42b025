//! Configuration loading and shared construction for the binaries.

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use mapstage_core::{
    load_config, load_config_from_env, validate_config, Cancellation, Config, Profile,
    S3ObjectStore, SanitizedConfig, StorageMode,
};

/// Config file used when neither `--config` nor `MAPSTAGE_CONFIG` is given.
pub const DEFAULT_CONFIG_FILE: &str = "mapstage.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageArg {
    Local,
    #[value(alias = "s3")]
    Remote,
}

impl From<StorageArg> for StorageMode {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::Local => StorageMode::Local,
            StorageArg::Remote => StorageMode::Remote,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    Car,
    Foot,
    Bicycle,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Car => Profile::Car,
            ProfileArg::Foot => Profile::Foot,
            ProfileArg::Bicycle => Profile::Bicycle,
        }
    }
}

/// Picks the config file: `explicit`, else `MAPSTAGE_CONFIG`, else
/// `mapstage.toml` when it exists.
fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var("MAPSTAGE_CONFIG") {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
    default.is_file().then_some(default)
}

/// Loads `.env`, the config file and environment overrides, then validates.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Ignoring unreadable .env file: {}", e),
    }

    let config = match config_path(explicit) {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            load_config(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => {
            info!("No config file, using defaults and environment");
            load_config_from_env().context("Failed to load config from environment")?
        }
    };

    validate_config(&config).context("Configuration validation failed")?;

    if let Ok(json) = serde_json::to_string(&SanitizedConfig::from(&config)) {
        debug!("Effective configuration: {}", json);
    }
    Ok(config)
}

/// Builds the S3 client when `needed`; a missing credential is fatal then.
pub fn build_store(config: &Config, needed: bool) -> Result<Option<Arc<S3ObjectStore>>> {
    if !needed {
        return Ok(None);
    }
    let store = S3ObjectStore::new(&config.storage)
        .context("Object store is not configured (set S3_ENDPOINT, S3_ACCESS_KEY, S3_SECRET_KEY)")?;
    Ok(Some(Arc::new(store)))
}

/// Cancels `cancel` on Ctrl-C.
pub fn cancel_on_interrupt(cancel: Cancellation) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_path_wins() {
        assert_eq!(
            config_path(Some(Path::new("/etc/mapstage.toml"))),
            Some(PathBuf::from("/etc/mapstage.toml"))
        );
    }

    #[test]
    fn test_storage_arg_alias() {
        assert_eq!(
            StorageArg::from_str("s3", true).map(StorageMode::from),
            Ok(StorageMode::Remote)
        );
        assert_eq!(
            StorageArg::from_str("local", true).map(StorageMode::from),
            Ok(StorageMode::Local)
        );
    }

    #[test]
    fn test_build_store_only_when_needed() {
        let config = Config::default();
        assert!(build_store(&config, false).unwrap().is_none());
        assert!(build_store(&config, true).is_err());
    }
}
