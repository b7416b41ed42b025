//! Compose runner tests against a shell script standing in for the compose
//! program.

#![cfg(unix)]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use mapstage_core::{
    config::{RunnerConfig, StepTarget},
    testing::fixtures::{compose_log, compose_stub},
    Cancellation, ComposeRunner, Profile, StepKind, StepOutcome, StepRunner,
};

struct Stub {
    runner: ComposeRunner,
    log: PathBuf,
    temp_dir: TempDir,
}

/// A runner whose `extract` stage uses `service`.
fn stub(service: &str, configure: impl FnOnce(&mut RunnerConfig)) -> Stub {
    let temp_dir = TempDir::new().unwrap();
    let (script, log) = compose_stub(temp_dir.path()).unwrap();

    let mut config = RunnerConfig {
        compose_program: vec!["sh".to_string(), script.display().to_string()],
        working_dir: Some(temp_dir.path().to_path_buf()),
        ..Default::default()
    };
    config.steps.extract = StepTarget {
        service: Some(service.to_string()),
        ..Default::default()
    };
    configure(&mut config);

    Stub {
        runner: ComposeRunner::new(config),
        log,
        temp_dir,
    }
}

fn down_calls(log: &[String]) -> usize {
    log.iter().filter(|line| line.ends_with(" down")).count()
}

#[tokio::test]
async fn test_success_keeps_output_tails() {
    let stub = stub("osrm-extract", |_| {});
    let result = stub
        .runner
        .run(StepKind::Extract, Duration::from_secs(30), &Cancellation::new())
        .await;

    assert_eq!(result.outcome, StepOutcome::Succeeded);
    assert_eq!(result.stdout_tail.len(), 20);
    assert_eq!(result.stdout_tail.last().map(String::as_str), Some("out 25"));
    assert_eq!(result.stderr_tail.len(), 10);
    assert_eq!(result.stderr_tail.first().map(String::as_str), Some("err 3"));
    assert!(result.teardown_error.is_none());

    let log = compose_log(&stub.log);
    assert_eq!(
        log,
        vec![
            "-f docker-compose.extract.yml up osrm-extract".to_string(),
            "-f docker-compose.extract.yml down".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_profile_is_exported_to_child() {
    let stub = stub("osrm-extract", |config| {
        config.profile = Profile::Bicycle;
        config.stdout_tail_lines = 100;
    });
    let result = stub
        .runner
        .run(StepKind::Extract, Duration::from_secs(30), &Cancellation::new())
        .await;

    assert_eq!(result.stdout_tail.first().map(String::as_str), Some("profile=bicycle"));
}

#[tokio::test]
async fn test_non_zero_exit_is_failure_with_teardown() {
    let stub = stub("fail", |_| {});
    let result = stub
        .runner
        .run(StepKind::Extract, Duration::from_secs(30), &Cancellation::new())
        .await;

    assert_eq!(result.outcome, StepOutcome::Failed { exit_code: Some(3) });
    assert_eq!(down_calls(&compose_log(&stub.log)), 1);
}

#[tokio::test]
async fn test_timeout_kills_and_tears_down_once() {
    let stub = stub("slow", |_| {});
    let start = Instant::now();
    let result = stub
        .runner
        .run(StepKind::Extract, Duration::from_secs(1), &Cancellation::new())
        .await;

    assert_eq!(result.outcome, StepOutcome::TimedOut { timeout_secs: 1 });
    assert!(start.elapsed() < Duration::from_secs(15));
    assert_eq!(down_calls(&compose_log(&stub.log)), 1);
}

#[tokio::test]
async fn test_cancellation_kills_and_tears_down() {
    let stub = stub("slow", |_| {});
    let cancel = Cancellation::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let result = stub
        .runner
        .run(StepKind::Extract, Duration::from_secs(60), &cancel)
        .await;

    assert_eq!(result.outcome, StepOutcome::Cancelled);
    assert!(start.elapsed() < Duration::from_secs(15));
    assert_eq!(down_calls(&compose_log(&stub.log)), 1);
}

#[tokio::test]
async fn test_abandoned_run_still_tears_down() {
    let stub = stub("slow", |_| {});
    let runner = std::sync::Arc::new(stub.runner);

    let handle = {
        let runner = runner.clone();
        tokio::spawn(async move {
            runner
                .run(StepKind::Extract, Duration::from_secs(60), &Cancellation::new())
                .await
        })
    };

    // Wait until `up` has been logged before abandoning the run.
    let deadline = Instant::now() + Duration::from_secs(10);
    while compose_log(&stub.log).is_empty() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    assert_eq!(down_calls(&compose_log(&stub.log)), 1);
}

#[tokio::test]
async fn test_non_utf8_output_does_not_break_the_step() {
    let stub = stub("binary", |_| {});
    let result = stub
        .runner
        .run(StepKind::Extract, Duration::from_secs(30), &Cancellation::new())
        .await;

    assert_eq!(result.outcome, StepOutcome::Succeeded);
    assert_eq!(result.stdout_tail.len(), 20);
    assert_eq!(result.stdout_tail.last().map(String::as_str), Some("after 30"));
}

#[tokio::test]
async fn test_non_utf8_line_is_kept_lossily() {
    let stub = stub("binary", |config| config.stdout_tail_lines = 100);
    let result = stub
        .runner
        .run(StepKind::Extract, Duration::from_secs(30), &Cancellation::new())
        .await;

    assert!(result.succeeded());
    let progress = result
        .stdout_tail
        .iter()
        .find(|line| line.starts_with("progress"))
        .unwrap();
    assert!(progress.contains('\u{FFFD}'));
    assert!(progress.ends_with(" bar"));
}

#[tokio::test]
async fn test_abandoned_run_with_hung_teardown_is_bounded() {
    let stub = stub("slow", |config| config.teardown_timeout_secs = 1);
    std::fs::write(stub.temp_dir.path().join("hang-down"), b"").unwrap();
    let runner = std::sync::Arc::new(stub.runner);

    let handle = {
        let runner = runner.clone();
        tokio::spawn(async move {
            runner
                .run(StepKind::Extract, Duration::from_secs(60), &Cancellation::new())
                .await
        })
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    while compose_log(&stub.log).is_empty() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let start = Instant::now();
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(down_calls(&compose_log(&stub.log)), 1);
}

#[tokio::test]
async fn test_hung_teardown_is_reported() {
    let stub = stub("osrm-extract", |config| config.teardown_timeout_secs = 1);
    std::fs::write(stub.temp_dir.path().join("hang-down"), b"").unwrap();

    let result = stub
        .runner
        .run(StepKind::Extract, Duration::from_secs(30), &Cancellation::new())
        .await;

    assert_eq!(result.outcome, StepOutcome::Succeeded);
    assert!(result.teardown_error.unwrap().contains("timed out"));
}
