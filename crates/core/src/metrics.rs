//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Processing steps (runs by outcome, duration)
//! - Dataset fetches and object transfers
//! - Complete pipeline runs

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::runner::StepOutcome;
use crate::storage::BatchReport;

// =============================================================================
// Processing steps
// =============================================================================

/// Step invocations by step and outcome.
pub static STEP_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mapstage_step_runs_total", "Total processing step invocations"),
        &["step", "outcome"], // outcome: "succeeded", "failed", "timed_out", "cancelled", "spawn_failed"
    )
    .unwrap()
});

/// Step duration in seconds, teardown included.
pub static STEP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mapstage_step_duration_seconds",
            "Duration of processing steps",
        )
        .buckets(vec![
            1.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0, 7200.0,
        ]),
        &["step"],
    )
    .unwrap()
});

/// Precondition checks that refused to start a step.
pub static PRECONDITION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mapstage_precondition_failures_total",
            "Steps refused because their input file was missing",
        ),
        &["step"],
    )
    .unwrap()
});

// =============================================================================
// Fetch and transfer
// =============================================================================

/// Dataset fetches by storage mode and result.
pub static FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mapstage_fetches_total", "Total dataset fetches"),
        &["mode", "result"], // result: "success", "failed"
    )
    .unwrap()
});

/// Files moved to or from the object store.
pub static TRANSFER_FILES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mapstage_transfer_files_total", "Files transferred"),
        &["direction", "result"], // direction: "upload", "download"
    )
    .unwrap()
});

/// Bytes moved to or from the object store.
pub static TRANSFER_BYTES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mapstage_transfer_bytes_total", "Bytes transferred"),
        &["direction"],
    )
    .unwrap()
});

// =============================================================================
// Pipeline
// =============================================================================

/// Complete pipeline runs by result.
pub static PIPELINE_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mapstage_pipeline_runs_total", "Total complete pipeline runs"),
        &["result"], // "done", "failed"
    )
    .unwrap()
});

/// Complete pipeline duration in seconds.
pub static PIPELINE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mapstage_pipeline_duration_seconds",
            "Duration of complete pipeline runs",
        )
        .buckets(vec![60.0, 300.0, 600.0, 1800.0, 3600.0, 7200.0, 14400.0]),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Label value for a step outcome.
pub fn outcome_label(outcome: &StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Succeeded => "succeeded",
        StepOutcome::Failed { .. } => "failed",
        StepOutcome::TimedOut { .. } => "timed_out",
        StepOutcome::Cancelled => "cancelled",
        StepOutcome::SpawnFailed { .. } => "spawn_failed",
    }
}

/// Adds a batch transfer to the transfer counters.
pub fn record_batch(direction: &str, report: &BatchReport) {
    TRANSFER_FILES
        .with_label_values(&[direction, "success"])
        .inc_by(report.transferred_count() as u64);
    TRANSFER_FILES
        .with_label_values(&[direction, "failed"])
        .inc_by(report.failed_count() as u64);
    TRANSFER_BYTES
        .with_label_values(&[direction])
        .inc_by(report.total_bytes());
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Steps
        Box::new(STEP_RUNS.clone()),
        Box::new(STEP_DURATION.clone()),
        Box::new(PRECONDITION_FAILURES.clone()),
        // Fetch and transfer
        Box::new(FETCHES.clone()),
        Box::new(TRANSFER_FILES.clone()),
        Box::new(TRANSFER_BYTES.clone()),
        // Pipeline
        Box::new(PIPELINE_RUNS.clone()),
        Box::new(PIPELINE_DURATION.clone()),
    ]
}

/// Encode all core metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let registry = Registry::new();
    for metric in all_metrics() {
        registry.register(metric)?;
    }

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
