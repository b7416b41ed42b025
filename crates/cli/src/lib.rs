//! Shared plumbing for the `mapstage` binaries.

pub mod logging;
pub mod settings;
pub mod transfer;

use mapstage_core::{ComposeRunner, HttpFetcher, PipelineOrchestrator, S3ObjectStore};

/// The orchestrator as the binaries assemble it.
pub type Orchestrator =
    PipelineOrchestrator<S3ObjectStore, HttpFetcher<S3ObjectStore>, ComposeRunner>;
