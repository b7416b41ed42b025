//! Pipeline orchestrator: fetch, three processing stages and the transfers
//! between them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::error::PipelineError;
use super::types::{PipelineReport, PipelineState, StorageMode};
use crate::config::Config;
use crate::fetcher::{DatasetArtifact, Fetcher};
use crate::layout::{CleanupReport, DataLayout};
use crate::metrics;
use crate::runner::{Cancellation, StepKind, StepOutcome, StepRunResult, StepRunner, StepSpec};
use crate::storage::{BatchReport, ObjectStore};
use crate::transfer::Transfer;

/// Suffixes a routing server needs from the processed directory.
pub const REQUIRED_SERVER_SUFFIXES: [&str; 4] =
    [".osrm.mldgr", ".osrm.cells", ".osrm.ebg", ".osrm.geometry"];

/// Drives the dataset through
/// `INIT -> FETCHED -> EXTRACTED -> PARTITIONED -> CUSTOMIZED -> DONE`.
///
/// The storage mode and configuration are fixed at construction. Stages run
/// strictly one after another; any failure ends the run in `FAILED`.
pub struct PipelineOrchestrator<S, F, R> {
    config: Config,
    mode: StorageMode,
    layout: DataLayout,
    transfer: Option<Transfer<S>>,
    fetcher: F,
    runner: R,
    cancel: Cancellation,
    timeout_override: Option<Duration>,
}

impl<S, F, R> PipelineOrchestrator<S, F, R>
where
    S: ObjectStore,
    F: Fetcher,
    R: StepRunner,
{
    /// `store` is only needed in remote mode and for server-data downloads.
    pub fn new(
        config: Config,
        mode: StorageMode,
        store: Option<Arc<S>>,
        fetcher: F,
        runner: R,
    ) -> Self {
        Self {
            layout: DataLayout::new(&config.layout),
            config,
            mode,
            transfer: store.map(Transfer::new),
            fetcher,
            runner,
            cancel: Cancellation::new(),
            timeout_override: None,
        }
    }

    /// Use `cancel` to stop the run from outside.
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use `timeout` for every stage instead of the configured values.
    pub fn with_timeout_override(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_override = timeout;
        self
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    fn transfer(&self) -> Result<&Transfer<S>, PipelineError> {
        self.transfer.as_ref().ok_or(PipelineError::NoStore)
    }

    fn check_cancelled(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// Local path of the file `step` consumes, if it has one.
    pub fn precondition_path(&self, step: StepKind) -> Option<PathBuf> {
        StepSpec::resolve(step, &self.config.runner)
            .requires
            .map(|suffix| {
                self.layout
                    .intermediate_dir()
                    .join(format!("{}{}", self.config.dataset.stem(), suffix))
            })
    }

    fn pipeline_timeout(&self, step: StepKind) -> Duration {
        self.timeout_override
            .unwrap_or_else(|| StepSpec::resolve(step, &self.config.runner).timeout)
    }

    fn standalone_timeout(&self, step: StepKind) -> Duration {
        self.timeout_override
            .unwrap_or_else(|| StepSpec::resolve_standalone(step, &self.config.runner).timeout)
    }

    /// Fetches the dataset into the raw directory (local) or raw prefix (remote).
    pub async fn download(&self) -> Result<DatasetArtifact, PipelineError> {
        self.check_cancelled()?;
        self.layout.ensure().await?;

        match self.fetcher.fetch(self.mode).await {
            Ok(artifact) => {
                metrics::FETCHES
                    .with_label_values(&[self.mode.as_str(), "success"])
                    .inc();
                info!(
                    "Fetched {} ({} bytes)",
                    artifact.filename, artifact.size_bytes
                );
                Ok(artifact)
            }
            Err(e) => {
                metrics::FETCHES
                    .with_label_values(&[self.mode.as_str(), "failed"])
                    .inc();
                Err(e.into())
            }
        }
    }

    /// Brings the stage's input in place, checks its precondition and runs it.
    ///
    /// A stage that ran and failed is `Ok` with an unsuccessful result; `Err`
    /// means it never started.
    async fn execute(
        &self,
        step: StepKind,
        timeout: Duration,
    ) -> Result<StepRunResult, PipelineError> {
        self.check_cancelled()?;
        self.layout.ensure().await?;

        if step == StepKind::Extract && self.mode.is_remote() {
            let transfer = self.transfer()?;
            let report = transfer
                .pull(
                    &self.config.remote.raw_prefix,
                    self.layout.raw_dir(),
                    Some(&self.config.dataset.filename),
                )
                .await?;
            metrics::record_batch("download", &report);
        }

        if let Some(path) = self.precondition_path(step) {
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                metrics::PRECONDITION_FAILURES
                    .with_label_values(&[step.as_str()])
                    .inc();
                error!("{} requires {}, which does not exist", step, path.display());
                return Err(PipelineError::MissingPrecondition { step, path });
            }
        }

        info!(step = %step, mode = %self.mode, "Starting stage");
        let result = self
            .runner
            .run(step, timeout, &self.cancel)
            .await;

        metrics::STEP_RUNS
            .with_label_values(&[step.as_str(), metrics::outcome_label(&result.outcome)])
            .inc();
        metrics::STEP_DURATION
            .with_label_values(&[step.as_str()])
            .observe(result.duration_ms as f64 / 1000.0);

        Ok(result)
    }

    /// Post-stage work: in remote mode `customize` publishes the processed
    /// directory.
    async fn finish_stage(&self, step: StepKind) -> Result<Option<BatchReport>, PipelineError> {
        if step == StepKind::Customize && self.mode.is_remote() {
            return self.publish_processed().await.map(Some);
        }
        Ok(None)
    }

    async fn publish_processed(&self) -> Result<BatchReport, PipelineError> {
        let prefix = &self.config.remote.processed_prefix;
        let report = self
            .transfer()?
            .push(self.layout.processed_dir(), prefix, None)
            .await?;
        metrics::record_batch("upload", &report);

        if !report.any_transferred() {
            return Err(PipelineError::EmptyTransfer {
                prefix: prefix.clone(),
            });
        }
        if !report.is_complete() {
            warn!(
                "{} processed files failed to upload",
                report.failed_count()
            );
        }
        Ok(report)
    }

    /// Runs one stage with the same staging rules as the complete pipeline.
    pub async fn run_stage(&self, step: StepKind) -> Result<StepRunResult, PipelineError> {
        let result = self.execute(step, self.standalone_timeout(step)).await?;
        if !result.succeeded() {
            return Err(PipelineError::StepFailed {
                step,
                outcome: result.outcome,
            });
        }
        self.finish_stage(step).await?;
        Ok(result)
    }

    /// Runs fetch and all three stages, always ending in `Done` or `Failed`.
    pub async fn run_complete(&self) -> PipelineReport {
        let mut report = PipelineReport::new(self.mode, self.config.runner.profile);
        info!(
            mode = %self.mode,
            profile = %self.config.runner.profile,
            dataset = %self.config.dataset.filename,
            "Starting complete pipeline"
        );

        match self.drive(&mut report).await {
            Ok(()) => report.advance(PipelineState::Done),
            Err(e) => {
                error!("Pipeline failed at {}: {}", report.state(), e);
                report.fail(e.to_string());
            }
        }
        report.finish();

        let result = if report.succeeded() { "done" } else { "failed" };
        metrics::PIPELINE_RUNS.with_label_values(&[result]).inc();
        metrics::PIPELINE_DURATION
            .with_label_values(&[result])
            .observe(report.duration_ms as f64 / 1000.0);

        info!(
            "Pipeline finished in state {} after {:.1}s",
            report.state(),
            report.duration_ms as f64 / 1000.0
        );
        report
    }

    async fn drive(&self, report: &mut PipelineReport) -> Result<(), PipelineError> {
        let artifact = self.download().await?;
        report.artifact = Some(artifact);
        report.advance(PipelineState::Fetched);

        for (step, reached) in [
            (StepKind::Extract, PipelineState::Extracted),
            (StepKind::Partition, PipelineState::Partitioned),
            (StepKind::Customize, PipelineState::Customized),
        ] {
            let result = self.execute(step, self.pipeline_timeout(step)).await?;
            let outcome = result.outcome.clone();
            report.steps.push(result);

            match outcome {
                StepOutcome::Succeeded => {}
                StepOutcome::Cancelled => return Err(PipelineError::Cancelled),
                outcome => return Err(PipelineError::StepFailed { step, outcome }),
            }

            if let Some(uploaded) = self.finish_stage(step).await? {
                report.uploaded = Some(uploaded);
            }
            report.advance(reached);
        }

        Ok(())
    }

    /// Mirrors the processed prefix into the processed directory and checks
    /// that every file a routing server needs arrived.
    pub async fn download_server_data(&self) -> Result<BatchReport, PipelineError> {
        self.check_cancelled()?;
        self.layout.ensure().await?;

        let prefix = &self.config.remote.processed_prefix;
        let report = self
            .transfer()?
            .pull(prefix, self.layout.processed_dir(), None)
            .await?;
        metrics::record_batch("download", &report);

        if !report.any_transferred() {
            return Err(PipelineError::EmptyTransfer {
                prefix: prefix.clone(),
            });
        }

        for item in &report.transferred {
            info!("  {} ({} bytes)", item.local_path.display(), item.bytes);
        }
        info!(
            "Downloaded {} server files, {:.1} MB total",
            report.transferred_count(),
            report.total_bytes() as f64 / (1024.0 * 1024.0)
        );

        let missing = missing_server_suffixes(&report);
        if !missing.is_empty() {
            return Err(PipelineError::MissingServerFiles { missing });
        }
        Ok(report)
    }

    /// Removes every file in the raw, intermediate and processed directories.
    pub async fn cleanup_local_data(&self) -> CleanupReport {
        let report = self.layout.clear_files().await;
        info!(
            "Cleanup removed {} files ({} bytes)",
            report.files_removed, report.bytes_removed
        );
        for err in &report.errors {
            warn!("{}", err);
        }
        report
    }
}

fn missing_server_suffixes(report: &BatchReport) -> Vec<String> {
    REQUIRED_SERVER_SUFFIXES
        .iter()
        .filter(|suffix| {
            !report.transferred.iter().any(|item| {
                item.local_path
                    .file_name()
                    .map(|name| name.to_string_lossy().ends_with(*suffix))
                    .unwrap_or(false)
            })
        })
        .map(|suffix| suffix.to_string())
        .collect()
}
