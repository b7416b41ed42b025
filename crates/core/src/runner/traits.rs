//! Trait definitions for the runner module.

use async_trait::async_trait;
use std::time::Duration;

use super::cancel::Cancellation;
use super::error::RunnerError;
use super::types::{StepKind, StepRunResult};

/// Runs one processing stage as an opaque external process.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Returns the name of this runner implementation.
    fn name(&self) -> &str;

    /// Runs the stage, bounded by `timeout` and `cancel`.
    ///
    /// Teardown runs once before this returns, whatever the outcome. The
    /// tool failing is reported in the result, never as an error.
    async fn run(&self, step: StepKind, timeout: Duration, cancel: &Cancellation)
        -> StepRunResult;

    /// Stops whatever the stage started.
    async fn teardown(&self, step: StepKind) -> Result<(), RunnerError>;
}
