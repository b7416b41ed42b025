use figment::{
    providers::{Env, Format, Toml},
    value::Uncased,
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Conventional environment variable names and the config keys they set.
const WELL_KNOWN_ENV: &[(&str, &str)] = &[
    ("S3_ENDPOINT", "storage.endpoint"),
    ("S3_ACCESS_KEY", "storage.access_key"),
    ("S3_SECRET_KEY", "storage.secret_key"),
    ("S3_BUCKET", "storage.bucket"),
    ("S3_REGION", "storage.region"),
    ("OSM_DOWNLOAD_URL", "dataset.url"),
    ("OSM_FILENAME", "dataset.filename"),
];

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    extract(Figment::new().merge(Toml::file(path)))
}

/// Load configuration from the environment only, on top of the defaults
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    extract(Figment::new())
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn extract(figment: Figment) -> Result<Config, ConfigError> {
    figment
        .merge(Env::prefixed("MAPSTAGE_").split("__"))
        .merge(well_known_env())
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn well_known_env() -> Env {
    let names: Vec<&str> = WELL_KNOWN_ENV.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&names).map(|key| {
        WELL_KNOWN_ENV
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, path)| Uncased::from(*path))
            .unwrap_or_else(|| Uncased::from(key.as_str().to_owned()))
    })
}
