//! Compose-based step runner.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::cancel::Cancellation;
use super::error::RunnerError;
use super::traits::StepRunner;
use super::types::{OutputTail, StepKind, StepOutcome, StepRunResult, StepSpec};
use crate::config::RunnerConfig;

/// Poll interval while the drop guard waits for `down`.
const GUARD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to keep reading output after the process ended or was killed.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs stages as `<program> -f <compose_file> up <service>` followed by
/// `<program> -f <compose_file> down`.
pub struct ComposeRunner {
    config: RunnerConfig,
}

impl ComposeRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn teardown_timeout(&self) -> Duration {
        Duration::from_secs(self.config.teardown_timeout_secs)
    }

    /// Builds the invocation shared by `up` and `down`.
    fn base_command(
        &self,
        spec: &StepSpec,
        args: &[&str],
    ) -> Result<std::process::Command, RunnerError> {
        let (program, leading) = self
            .config
            .compose_program
            .split_first()
            .ok_or(RunnerError::NoProgram)?;

        let mut command = std::process::Command::new(program);
        command
            .args(leading)
            .arg("-f")
            .arg(&spec.compose_file)
            .args(args)
            .env("OSRM_PROFILE", self.config.profile.as_str())
            .stdin(Stdio::null());

        if let Some(ref dir) = self.config.working_dir {
            command.current_dir(dir);
        }

        Ok(command)
    }

    /// Starts `up` and waits for it, racing the timeout and cancellation.
    async fn invoke(
        &self,
        spec: &StepSpec,
        timeout: Duration,
        cancel: &Cancellation,
    ) -> (StepOutcome, Vec<String>, Vec<String>) {
        if cancel.is_cancelled() {
            return (StepOutcome::Cancelled, Vec::new(), Vec::new());
        }

        let mut command = match self.base_command(spec, &["up", &spec.service]) {
            Ok(command) => Command::from(command),
            Err(e) => {
                return (
                    StepOutcome::SpawnFailed {
                        reason: e.to_string(),
                    },
                    Vec::new(),
                    Vec::new(),
                )
            }
        };
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let reason = if e.kind() == std::io::ErrorKind::NotFound {
                    format!(
                        "compose program not found: {}",
                        self.config.compose_program.join(" ")
                    )
                } else {
                    e.to_string()
                };
                error!("Failed to start {}: {}", spec.step, reason);
                return (StepOutcome::SpawnFailed { reason }, Vec::new(), Vec::new());
            }
        };

        let stdout_tail = Arc::new(Mutex::new(OutputTail::new(self.config.stdout_tail_lines)));
        let stderr_tail = Arc::new(Mutex::new(OutputTail::new(self.config.stderr_tail_lines)));

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(collect_lines(
                stdout,
                stdout_tail.clone(),
                spec.step,
                "stdout",
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(collect_lines(
                stderr,
                stderr_tail.clone(),
                spec.step,
                "stderr",
            )));
        }

        let outcome = tokio::select! {
            waited = tokio::time::timeout(timeout, child.wait()) => match waited {
                Ok(Ok(status)) if status.success() => StepOutcome::Succeeded,
                Ok(Ok(status)) => StepOutcome::Failed { exit_code: status.code() },
                Ok(Err(e)) => {
                    error!("Failed to wait for {}: {}", spec.step, e);
                    StepOutcome::Failed { exit_code: None }
                }
                Err(_) => StepOutcome::TimedOut { timeout_secs: timeout.as_secs() },
            },
            _ = cancel.cancelled() => StepOutcome::Cancelled,
        };

        if matches!(
            outcome,
            StepOutcome::TimedOut { .. } | StepOutcome::Cancelled
        ) {
            // Kill the process on timeout or cancellation
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {} process: {}", spec.step, e);
            }
        }

        for mut reader in readers {
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader)
                .await
                .is_err()
            {
                reader.abort();
            }
        }

        (
            outcome,
            snapshot(&stdout_tail),
            snapshot(&stderr_tail),
        )
    }
}

async fn collect_lines<R>(
    reader: R,
    tail: Arc<Mutex<OutputTail>>,
    step: StepKind,
    stream: &'static str,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    // Drain to EOF. Invalid UTF-8 is replaced, not treated as the end.
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(step = %step, stream, "Stopped reading output: {}", e);
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        debug!(step = %step, stream, "{}", line);
        if let Ok(mut tail) = tail.lock() {
            tail.push(line.to_string());
        }
    }
}

fn snapshot(tail: &Mutex<OutputTail>) -> Vec<String> {
    tail.lock().map(|tail| tail.lines()).unwrap_or_default()
}

#[async_trait]
impl StepRunner for ComposeRunner {
    fn name(&self) -> &str {
        "compose"
    }

    async fn run(
        &self,
        step: StepKind,
        timeout: Duration,
        cancel: &Cancellation,
    ) -> StepRunResult {
        let start = Instant::now();
        let spec = StepSpec::resolve(step, &self.config);
        let mut guard = TeardownGuard {
            command: self.base_command(&spec, &["down"]).ok(),
            step,
            timeout: self.teardown_timeout(),
        };

        info!(
            step = %step,
            service = %spec.service,
            compose_file = %spec.compose_file.display(),
            profile = %self.config.profile,
            timeout_secs = timeout.as_secs(),
            "Running processing step"
        );

        let (outcome, stdout_tail, stderr_tail) = self.invoke(&spec, timeout, cancel).await;

        let teardown_error = match self.teardown(step).await {
            Ok(()) => None,
            Err(e) => {
                warn!("{}", e);
                Some(e.to_string())
            }
        };
        guard.disarm();

        let duration_ms = start.elapsed().as_millis() as u64;
        if outcome.is_success() {
            info!("{} completed in {} ms", step, duration_ms);
        } else {
            error!("{} {}", step, outcome);
            for line in &stdout_tail {
                warn!(step = %step, stream = "stdout", "{}", line);
            }
            for line in &stderr_tail {
                error!(step = %step, stream = "stderr", "{}", line);
            }
        }

        StepRunResult {
            step,
            outcome,
            stdout_tail,
            stderr_tail,
            duration_ms,
            teardown_error,
        }
    }

    async fn teardown(&self, step: StepKind) -> Result<(), RunnerError> {
        let spec = StepSpec::resolve(step, &self.config);
        let mut command = Command::from(self.base_command(&spec, &["down"])?);
        command
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout = self.teardown_timeout();
        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(RunnerError::teardown_failed(step, e.to_string())),
            Err(_) => {
                return Err(RunnerError::teardown_failed(
                    step,
                    format!("timed out after {} seconds", timeout.as_secs()),
                ))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RunnerError::teardown_failed(
                step,
                format!(
                    "exited with code {:?}: {}",
                    output.status.code(),
                    stderr.lines().last().unwrap_or_default()
                ),
            ));
        }

        debug!("Stopped services for {}", step);
        Ok(())
    }
}

/// Runs `down` synchronously if the run future is dropped before its own
/// teardown finished. The wait is bounded by `timeout`; a `down` that
/// outlives it is killed.
struct TeardownGuard {
    command: Option<std::process::Command>,
    step: StepKind,
    timeout: Duration,
}

impl TeardownGuard {
    fn disarm(&mut self) {
        self.command = None;
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        let Some(mut command) = self.command.take() else {
            return;
        };
        warn!("{} was abandoned mid-run; tearing down", self.step);

        let mut child = match command.stdout(Stdio::null()).stderr(Stdio::null()).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Teardown of {} failed to start: {}", self.step, e);
                return;
            }
        };

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return,
                Ok(Some(status)) => {
                    warn!("Teardown of {} exited with {}", self.step, status);
                    return;
                }
                Ok(None) if Instant::now() < deadline => std::thread::sleep(GUARD_POLL_INTERVAL),
                Ok(None) => {
                    warn!(
                        "Teardown of {} still running after {} seconds, killing it",
                        self.step,
                        self.timeout.as_secs()
                    );
                    let _ = child.kill();
                    let _ = child.wait();
                    return;
                }
                Err(e) => {
                    warn!("Teardown of {} failed: {}", self.step, e);
                    return;
                }
            }
        }
    }
}
