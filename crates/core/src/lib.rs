pub mod config;
pub mod fetcher;
pub mod layout;
pub mod metrics;
pub mod pipeline;
pub mod runner;
pub mod storage;
pub mod testing;
pub mod transfer;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError, SanitizedConfig,
};
pub use fetcher::{ArtifactLocation, DatasetArtifact, FetchError, Fetcher, HttpFetcher};
pub use layout::{CleanupReport, DataLayout};
pub use pipeline::{
    PipelineError, PipelineOrchestrator, PipelineReport, PipelineState, StorageMode,
};
pub use runner::{
    Cancellation, ComposeRunner, Profile, RunnerError, StepKind, StepOutcome, StepRunResult,
    StepRunner,
};
pub use storage::{BatchReport, ObjectMetadata, ObjectStore, S3ObjectStore, StorageError};
pub use transfer::{Transfer, TransferError};
