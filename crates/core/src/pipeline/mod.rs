//! Pipeline orchestration.
//!
//! The orchestrator sequences the fetch, the three processing stages and,
//! in remote storage mode, the transfers between them:
//!
//! ```text
//! INIT -> FETCHED -> EXTRACTED -> PARTITIONED -> CUSTOMIZED -> DONE
//!    \________\___________\____________\_____________\-> FAILED
//! ```
//!
//! Single-stage operations, server-data download and local cleanup reuse
//! the same staging rules.

mod error;
mod orchestrator;
mod types;

pub use crate::runner::Cancellation;
pub use error::PipelineError;
pub use orchestrator::{PipelineOrchestrator, REQUIRED_SERVER_SUFFIXES};
pub use types::{PipelineReport, PipelineState, StorageMode};
