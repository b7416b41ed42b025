//! Types for the runner module.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::error::RunnerError;
use crate::config::RunnerConfig;

/// The three processing stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Extract,
    Partition,
    Customize,
}

impl StepKind {
    pub const ALL: [StepKind; 3] = [StepKind::Extract, StepKind::Partition, StepKind::Customize];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Extract => "extract",
            StepKind::Partition => "partition",
            StepKind::Customize => "customize",
        }
    }

    /// `docker-compose.<step>.yml`
    pub fn default_compose_file(&self) -> PathBuf {
        PathBuf::from(format!("docker-compose.{}.yml", self.as_str()))
    }

    /// `osrm-<step>`
    pub fn default_service(&self) -> String {
        format!("osrm-{}", self.as_str())
    }

    /// Suffix of the intermediate file the stage consumes, if any.
    pub fn default_requires(&self) -> Option<&'static str> {
        match self {
            StepKind::Extract => None,
            StepKind::Partition | StepKind::Customize => Some(".osrm.ebg"),
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "extract" => Ok(StepKind::Extract),
            "partition" => Ok(StepKind::Partition),
            "customize" => Ok(StepKind::Customize),
            _ => Err(RunnerError::UnknownStep(s.to_string())),
        }
    }
}

/// Routing profile handed to the processing containers as `OSRM_PROFILE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Car,
    Foot,
    Bicycle,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Car => "car",
            Profile::Foot => "foot",
            Profile::Bicycle => "bicycle",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "car" => Ok(Profile::Car),
            "foot" => Ok(Profile::Foot),
            "bicycle" => Ok(Profile::Bicycle),
            _ => Err(RunnerError::UnknownProfile(s.to_string())),
        }
    }
}

/// A stage with every configurable field filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    pub step: StepKind,
    pub compose_file: PathBuf,
    pub service: String,
    pub timeout: Duration,
    /// Required intermediate-file suffix, appended to the dataset stem.
    pub requires: Option<String>,
}

impl StepSpec {
    /// Merges the per-step overrides from `config` over the stage defaults,
    /// for a stage run inside the complete pipeline.
    pub fn resolve(step: StepKind, config: &RunnerConfig) -> Self {
        Self::resolve_with_default(step, config, config.default_timeout_secs)
    }

    /// Like [`StepSpec::resolve`], for a stage run on its own: a step without
    /// its own timeout gets `stage_timeout_secs`.
    pub fn resolve_standalone(step: StepKind, config: &RunnerConfig) -> Self {
        Self::resolve_with_default(step, config, config.stage_timeout_secs)
    }

    fn resolve_with_default(step: StepKind, config: &RunnerConfig, default_secs: u64) -> Self {
        let target = config.steps.get(step);
        Self {
            step,
            compose_file: target
                .compose_file
                .clone()
                .unwrap_or_else(|| step.default_compose_file()),
            service: target
                .service
                .clone()
                .unwrap_or_else(|| step.default_service()),
            timeout: Duration::from_secs(target.timeout_secs.unwrap_or(default_secs)),
            requires: target
                .requires
                .clone()
                .or_else(|| step.default_requires().map(str::to_string))
                .filter(|suffix| !suffix.is_empty()),
        }
    }
}

/// How a single stage invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    /// Non-zero exit. `None` when the process was ended by a signal.
    Failed { exit_code: Option<i32> },
    TimedOut { timeout_secs: u64 },
    Cancelled,
    SpawnFailed { reason: String },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Succeeded)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Succeeded => write!(f, "succeeded"),
            StepOutcome::Failed {
                exit_code: Some(code),
            } => write!(f, "exited with code {}", code),
            StepOutcome::Failed { exit_code: None } => write!(f, "terminated by signal"),
            StepOutcome::TimedOut { timeout_secs } => {
                write!(f, "timed out after {} seconds", timeout_secs)
            }
            StepOutcome::Cancelled => write!(f, "cancelled"),
            StepOutcome::SpawnFailed { reason } => write!(f, "failed to start: {}", reason),
        }
    }
}

/// Result of one stage invocation, teardown included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRunResult {
    pub step: StepKind,
    pub outcome: StepOutcome,
    pub stdout_tail: Vec<String>,
    pub stderr_tail: Vec<String>,
    pub duration_ms: u64,
    /// Set when `down` failed; never affects `outcome`.
    pub teardown_error: Option<String>,
}

impl StepRunResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Keeps the last `capacity` lines pushed into it.
#[derive(Debug, Clone)]
pub struct OutputTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}
