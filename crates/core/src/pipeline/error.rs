//! Error types for the pipeline module.

use std::path::PathBuf;
use thiserror::Error;

use crate::fetcher::FetchError;
use crate::runner::{StepKind, StepOutcome};
use crate::transfer::TransferError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unknown storage mode: {0} (expected local or remote)")]
    UnknownStorageMode(String),

    #[error("Remote storage mode requires object store credentials")]
    NoStore,

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Cannot run {step}: required input {path} is missing")]
    MissingPrecondition { step: StepKind, path: PathBuf },

    #[error("Step {step} {outcome}")]
    StepFailed { step: StepKind, outcome: StepOutcome },

    #[error("No files transferred for {prefix}")]
    EmptyTransfer { prefix: String },

    #[error("Server data incomplete, missing files ending in: {}", missing.join(", "))]
    MissingServerFiles { missing: Vec<String> },

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
