//! Types for the pipeline module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::PipelineError;
use crate::fetcher::DatasetArtifact;
use crate::runner::{Profile, StepRunResult};
use crate::storage::BatchReport;

/// Where artifacts live between stages. Fixed for the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    Local,
    #[serde(alias = "s3")]
    Remote,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Local => "local",
            StorageMode::Remote => "remote",
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, StorageMode::Remote)
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(StorageMode::Local),
            "remote" | "s3" => Ok(StorageMode::Remote),
            _ => Err(PipelineError::UnknownStorageMode(s.to_string())),
        }
    }
}

/// States of the complete pipeline. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Init,
    Fetched,
    Extracted,
    Partitioned,
    Customized,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Init => "INIT",
            PipelineState::Fetched => "FETCHED",
            PipelineState::Extracted => "EXTRACTED",
            PipelineState::Partitioned => "PARTITIONED",
            PipelineState::Customized => "CUSTOMIZED",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one complete-pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub mode: StorageMode,
    pub profile: Profile,
    /// Every state visited, starting with `Init` and ending in a terminal state.
    pub states: Vec<PipelineState>,
    /// Last non-terminal state reached before failing.
    pub failed_at: Option<PipelineState>,
    pub failure_reason: Option<String>,
    pub artifact: Option<DatasetArtifact>,
    pub steps: Vec<StepRunResult>,
    pub uploaded: Option<BatchReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn new(mode: StorageMode, profile: Profile) -> Self {
        Self {
            mode,
            profile,
            states: vec![PipelineState::Init],
            failed_at: None,
            failure_reason: None,
            artifact: None,
            steps: Vec::new(),
            uploaded: None,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: 0,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or(PipelineState::Init)
    }

    pub fn succeeded(&self) -> bool {
        self.state() == PipelineState::Done
    }

    pub(crate) fn advance(&mut self, state: PipelineState) {
        self.states.push(state);
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.failed_at = Some(self.state());
        self.failure_reason = Some(reason.into());
        self.states.push(PipelineState::Failed);
    }

    pub(crate) fn finish(&mut self) {
        let finished_at = Utc::now();
        self.duration_ms = (finished_at - self.started_at).num_milliseconds().max(0) as u64;
        self.finished_at = Some(finished_at);
    }
}
