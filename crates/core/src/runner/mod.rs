//! Step runner for the containerized processing stages.
//!
//! Each stage (`extract`, `partition`, `customize`) is an opaque external
//! process started through a compose-style tool. The runner bounds the wait
//! with a timeout and a [`Cancellation`] handle and always tears the stage
//! down afterwards.
//!
//! # Example
//!
//! ```ignore
//! use mapstage_core::runner::{Cancellation, ComposeRunner, StepKind, StepRunner};
//!
//! let runner = ComposeRunner::new(config.runner.clone());
//! let result = runner
//!     .run(StepKind::Extract, Duration::from_secs(1800), &Cancellation::new())
//!     .await;
//! if !result.succeeded() {
//!     eprintln!("{}", result.stderr_tail.join("\n"));
//! }
//! ```

mod cancel;
mod compose;
mod error;
mod traits;
mod types;

pub use cancel::Cancellation;
pub use compose::ComposeRunner;
pub use error::RunnerError;
pub use traits::StepRunner;
pub use types::{OutputTail, Profile, StepKind, StepOutcome, StepRunResult, StepSpec};
