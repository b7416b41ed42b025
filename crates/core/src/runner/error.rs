//! Error types for the runner module.

use thiserror::Error;

/// Errors surfaced by the step runner.
///
/// The external tool failing is not an error here; it is reported through
/// `StepOutcome`. These cover parsing and teardown.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Unknown processing step: {0} (expected extract, partition or customize)")]
    UnknownStep(String),

    #[error("Unknown routing profile: {0} (expected car, foot or bicycle)")]
    UnknownProfile(String),

    #[error("Compose program is not configured")]
    NoProgram,

    #[error("Teardown of {step} failed: {reason}")]
    TeardownFailed { step: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    pub fn teardown_failed(step: impl ToString, reason: impl Into<String>) -> Self {
        Self::TeardownFailed {
            step: step.to_string(),
            reason: reason.into(),
        }
    }
}
