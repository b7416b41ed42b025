//! Mock step runner for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::runner::{Cancellation, RunnerError, StepKind, StepOutcome, StepRunResult, StepRunner};

/// A recorded invocation for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRun {
    pub step: StepKind,
    pub timeout: Duration,
}

/// Mock implementation of the StepRunner trait.
///
/// Every step succeeds unless an outcome is set with
/// [`set_outcome`](MockStepRunner::set_outcome). A successful step writes the
/// files registered with [`produce`](MockStepRunner::produce), standing in
/// for the container's output.
#[derive(Debug, Clone, Default)]
pub struct MockStepRunner {
    runs: Arc<RwLock<Vec<RecordedRun>>>,
    teardowns: Arc<RwLock<Vec<StepKind>>>,
    outcomes: Arc<RwLock<HashMap<StepKind, StepOutcome>>>,
    outputs: Arc<RwLock<HashMap<StepKind, Vec<PathBuf>>>>,
    /// Wait this long before finishing, racing cancellation.
    delay: Arc<RwLock<Duration>>,
}

impl MockStepRunner {
    /// Create a runner where every step succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the outcome `step` reports.
    pub async fn set_outcome(&self, step: StepKind, outcome: StepOutcome) {
        self.outcomes.write().await.insert(step, outcome);
    }

    /// Write `path` when `step` succeeds.
    pub async fn produce(&self, step: StepKind, path: impl Into<PathBuf>) {
        self.outputs
            .write()
            .await
            .entry(step)
            .or_default()
            .push(path.into());
    }

    /// Simulated run time.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Get all recorded runs.
    pub async fn recorded_runs(&self) -> Vec<RecordedRun> {
        self.runs.read().await.clone()
    }

    /// Steps that were run, in order.
    pub async fn run_steps(&self) -> Vec<StepKind> {
        self.runs.read().await.iter().map(|r| r.step).collect()
    }

    /// Get the number of teardowns performed.
    pub async fn teardown_count(&self) -> usize {
        self.teardowns.read().await.len()
    }
}

#[async_trait]
impl StepRunner for MockStepRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&self, step: StepKind, timeout: Duration, cancel: &Cancellation) -> StepRunResult {
        self.runs.write().await.push(RecordedRun { step, timeout });

        let delay = *self.delay.read().await;
        let mut outcome = self
            .outcomes
            .read()
            .await
            .get(&step)
            .cloned()
            .unwrap_or(StepOutcome::Succeeded);

        if cancel.is_cancelled() {
            outcome = StepOutcome::Cancelled;
        } else if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => outcome = StepOutcome::Cancelled,
            }
        }

        if outcome.is_success() {
            let outputs = self.outputs.read().await.get(&step).cloned().unwrap_or_default();
            for path in outputs {
                if let Some(parent) = path.parent() {
                    let _ = tokio::fs::create_dir_all(parent).await;
                }
                let _ = tokio::fs::write(&path, step.as_str()).await;
            }
        }

        let teardown_error = self.teardown(step).await.err().map(|e| e.to_string());

        StepRunResult {
            step,
            outcome,
            stdout_tail: vec![format!("{} output", step)],
            stderr_tail: Vec::new(),
            duration_ms: delay.as_millis() as u64,
            teardown_error,
        }
    }

    async fn teardown(&self, step: StepKind) -> Result<(), RunnerError> {
        self.teardowns.write().await.push(step);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_runs_and_teardowns() {
        let runner = MockStepRunner::new();
        runner
            .set_outcome(StepKind::Partition, StepOutcome::Failed { exit_code: Some(1) })
            .await;

        let cancel = Cancellation::new();
        let ok = runner.run(StepKind::Extract, Duration::from_secs(1), &cancel).await;
        let failed = runner.run(StepKind::Partition, Duration::from_secs(2), &cancel).await;

        assert!(ok.succeeded());
        assert!(!failed.succeeded());
        assert_eq!(runner.run_steps().await, vec![StepKind::Extract, StepKind::Partition]);
        assert_eq!(runner.teardown_count().await, 2);
    }

    #[tokio::test]
    async fn test_cancellation_during_delay() {
        let runner = MockStepRunner::new();
        runner.set_delay(Duration::from_secs(30)).await;

        let cancel = Cancellation::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = runner.run(StepKind::Extract, Duration::from_secs(60), &cancel).await;
        assert_eq!(result.outcome, StepOutcome::Cancelled);
        assert_eq!(runner.teardown_count().await, 1);
    }
}
