use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::runner::{Profile, StepKind};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Object store connection settings.
///
/// Credentials are optional here because local-mode runs never touch the
/// store; the S3 client refuses to build without them.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Compare the returned ETag against the local MD5 after single-part uploads.
    #[serde(default)]
    pub verify_uploads: bool,
    /// Files at least this large are uploaded in parts.
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: u64,
    #[serde(default = "default_multipart_part_size")]
    pub multipart_part_size_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            access_key: None,
            secret_key: None,
            bucket: default_bucket(),
            region: default_region(),
            verify_uploads: false,
            multipart_threshold_bytes: default_multipart_threshold(),
            multipart_part_size_bytes: default_multipart_part_size(),
        }
    }
}

/// Smallest part size S3 accepts for every part but the last.
pub const MIN_MULTIPART_PART_SIZE: u64 = 5 * 1024 * 1024;

fn default_multipart_threshold() -> u64 {
    64 * 1024 * 1024
}

fn default_multipart_part_size() -> u64 {
    16 * 1024 * 1024
}

fn default_bucket() -> String {
    "dev".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// The raw map extract to download.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetConfig {
    #[serde(default = "default_dataset_url")]
    pub url: String,
    #[serde(default = "default_dataset_filename")]
    pub filename: String,
    /// Connect timeout for the HTTP download in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            url: default_dataset_url(),
            filename: default_dataset_filename(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl DatasetConfig {
    /// Base name shared by every derived artifact (`california-latest` for
    /// `california-latest.osm.pbf`).
    pub fn stem(&self) -> &str {
        if let Some(stem) = self.filename.strip_suffix(".osm.pbf") {
            return stem;
        }
        match self.filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.filename,
        }
    }
}

fn default_dataset_url() -> String {
    "http://download.geofabrik.de/north-america/us/california-latest.osm.pbf".to_string()
}

fn default_dataset_filename() -> String {
    "california-latest.osm.pbf".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

/// Local directory skeleton.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayoutConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_raw")]
    pub raw: String,
    #[serde(default = "default_intermediate")]
    pub intermediate: String,
    #[serde(default = "default_processed")]
    pub processed: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            raw: default_raw(),
            intermediate: default_intermediate(),
            processed: default_processed(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_raw() -> String {
    "raw".to_string()
}

fn default_intermediate() -> String {
    "intermediate".to_string()
}

fn default_processed() -> String {
    "processed".to_string()
}

/// Remote key prefixes used by the pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(default = "default_raw_prefix")]
    pub raw_prefix: String,
    #[serde(default = "default_processed_prefix")]
    pub processed_prefix: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            raw_prefix: default_raw_prefix(),
            processed_prefix: default_processed_prefix(),
        }
    }
}

fn default_raw_prefix() -> String {
    "osrm/raw".to_string()
}

fn default_processed_prefix() -> String {
    "osrm/processed".to_string()
}

/// External compose tool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// Program and leading arguments, e.g. `["docker", "compose"]`.
    #[serde(default = "default_compose_program")]
    pub compose_program: Vec<String>,
    /// Working directory for compose invocations (defaults to the process cwd).
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub profile: Profile,
    /// Per-stage timeout inside the complete pipeline.
    #[serde(default = "default_step_timeout")]
    pub default_timeout_secs: u64,
    /// Per-stage timeout when a single stage is run on its own.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
    /// Upper bound for `down`.
    #[serde(default = "default_teardown_timeout")]
    pub teardown_timeout_secs: u64,
    #[serde(default = "default_stdout_tail")]
    pub stdout_tail_lines: usize,
    #[serde(default = "default_stderr_tail")]
    pub stderr_tail_lines: usize,
    #[serde(default)]
    pub steps: StepTable,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            compose_program: default_compose_program(),
            working_dir: None,
            profile: Profile::default(),
            default_timeout_secs: default_step_timeout(),
            stage_timeout_secs: default_stage_timeout(),
            teardown_timeout_secs: default_teardown_timeout(),
            stdout_tail_lines: default_stdout_tail(),
            stderr_tail_lines: default_stderr_tail(),
            steps: StepTable::default(),
        }
    }
}

fn default_compose_program() -> Vec<String> {
    vec!["docker-compose".to_string()]
}

fn default_step_timeout() -> u64 {
    1800
}

fn default_stage_timeout() -> u64 {
    3600
}

fn default_teardown_timeout() -> u64 {
    300
}

fn default_stdout_tail() -> usize {
    20
}

fn default_stderr_tail() -> usize {
    10
}

/// Per-stage invocation targets. Only the three known stages are accepted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StepTable {
    #[serde(default)]
    pub extract: StepTarget,
    #[serde(default)]
    pub partition: StepTarget,
    #[serde(default)]
    pub customize: StepTarget,
}

impl StepTable {
    pub fn get(&self, step: StepKind) -> &StepTarget {
        match step {
            StepKind::Extract => &self.extract,
            StepKind::Partition => &self.partition,
            StepKind::Customize => &self.customize,
        }
    }
}

/// Overrides for one stage; unset fields fall back to the stage defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StepTarget {
    #[serde(default)]
    pub compose_file: Option<PathBuf>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Suffix (appended to the dataset stem) of the file that must exist in
    /// the intermediate directory before this stage may run.
    #[serde(default)]
    pub requires: Option<String>,
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub storage: SanitizedStorageConfig,
    pub dataset: DatasetConfig,
    pub layout: LayoutConfig,
    pub remote: RemoteConfig,
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub endpoint: Option<String>,
    pub bucket: String,
    pub region: String,
    pub access_key_configured: bool,
    pub secret_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            storage: SanitizedStorageConfig {
                endpoint: config.storage.endpoint.clone(),
                bucket: config.storage.bucket.clone(),
                region: config.storage.region.clone(),
                access_key_configured: config
                    .storage
                    .access_key
                    .as_deref()
                    .is_some_and(|k| !k.is_empty()),
                secret_key_configured: config
                    .storage
                    .secret_key
                    .as_deref()
                    .is_some_and(|k| !k.is_empty()),
            },
            dataset: config.dataset.clone(),
            layout: config.layout.clone(),
            remote: config.remote.clone(),
            runner: config.runner.clone(),
        }
    }
}
