use super::types::{Config, MIN_MULTIPART_PART_SIZE};
use super::ConfigError;
use crate::runner::StepKind;

/// Validate configuration
/// Currently validates:
/// - Dataset URL uses http(s) and the filename is a bare file name
/// - Remote prefixes are non-empty and relative
/// - Multipart part size is one S3 accepts
/// - Compose program is set and every step timeout is positive
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let url = config.dataset.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::ValidationError(format!(
            "dataset.url must be an http(s) URL, got {:?}",
            config.dataset.url
        )));
    }

    let filename = &config.dataset.filename;
    if filename.is_empty() || filename.contains('/') || filename.contains('\\') {
        return Err(ConfigError::ValidationError(format!(
            "dataset.filename must be a plain file name, got {:?}",
            filename
        )));
    }

    for (name, prefix) in [
        ("remote.raw_prefix", &config.remote.raw_prefix),
        ("remote.processed_prefix", &config.remote.processed_prefix),
    ] {
        if prefix.trim_matches('/').is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                name
            )));
        }
        if prefix.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "{} must not start with '/'",
                name
            )));
        }
    }

    if config.storage.multipart_part_size_bytes < MIN_MULTIPART_PART_SIZE {
        return Err(ConfigError::ValidationError(format!(
            "storage.multipart_part_size_bytes must be at least {}",
            MIN_MULTIPART_PART_SIZE
        )));
    }
    if config.storage.multipart_threshold_bytes < config.storage.multipart_part_size_bytes {
        return Err(ConfigError::ValidationError(
            "storage.multipart_threshold_bytes cannot be below the part size".to_string(),
        ));
    }

    if config.runner.compose_program.is_empty() {
        return Err(ConfigError::ValidationError(
            "runner.compose_program cannot be empty".to_string(),
        ));
    }

    for (name, secs) in [
        ("runner.default_timeout_secs", config.runner.default_timeout_secs),
        ("runner.stage_timeout_secs", config.runner.stage_timeout_secs),
        ("runner.teardown_timeout_secs", config.runner.teardown_timeout_secs),
    ] {
        if secs == 0 {
            return Err(ConfigError::ValidationError(format!("{} cannot be 0", name)));
        }
    }

    for step in StepKind::ALL {
        if config.runner.steps.get(step).timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(format!(
                "runner.steps.{}.timeout_secs cannot be 0",
                step
            )));
        }
    }

    Ok(())
}
