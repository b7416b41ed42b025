//! The `mapstage-transfer` operation: one file or a whole directory between
//! a local path and a key prefix.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use tracing::{info, warn};

use mapstage_core::{metrics, BatchReport, ObjectStore, Transfer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub direction: Direction,
    pub remote_path: String,
    pub local_path: PathBuf,
    /// Single file inside `local_path` / under `remote_path`.
    pub filename: Option<String>,
    /// Create the target folder first: a marker object for directory
    /// uploads, the local directory for downloads.
    pub create_dirs: bool,
}

/// Runs `request`.
///
/// A single-file transfer fails on any error. A directory transfer succeeds
/// when at least one file moved; per-file failures are logged.
pub async fn run<S: ObjectStore>(
    transfer: &Transfer<S>,
    request: &TransferRequest,
) -> Result<BatchReport> {
    let filename = request.filename.as_deref();
    let report = match request.direction {
        Direction::Upload => {
            if request.create_dirs && filename.is_none() {
                transfer.create_folder(&request.remote_path).await?;
                info!(
                    "Created folder {}/",
                    request.remote_path.trim_end_matches('/')
                );
            }
            transfer
                .push(&request.local_path, &request.remote_path, filename)
                .await?
        }
        Direction::Download => {
            if request.create_dirs {
                tokio::fs::create_dir_all(&request.local_path)
                    .await
                    .with_context(|| {
                        format!("Failed to create {}", request.local_path.display())
                    })?;
            }
            transfer
                .pull(&request.remote_path, &request.local_path, filename)
                .await?
        }
    };
    metrics::record_batch(request.direction.as_str(), &report);

    check(request.direction, &report)?;
    Ok(report)
}

fn check(direction: Direction, report: &BatchReport) -> Result<()> {
    for failure in &report.failures {
        warn!(
            "{} failed for {}: {}",
            direction.as_str(),
            failure.item,
            failure.reason
        );
    }
    if !report.any_transferred() {
        bail!("Nothing to {}", direction.as_str());
    }
    info!(
        "{} {} files ({} bytes), {} failed",
        match direction {
            Direction::Download => "Downloaded",
            Direction::Upload => "Uploaded",
        },
        report.transferred_count(),
        report.total_bytes(),
        report.failed_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapstage_core::testing::{MockObjectStore, RecordedStoreCall};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn request(direction: Direction, local_path: PathBuf) -> TransferRequest {
        TransferRequest {
            direction,
            remote_path: "osrm/processed".to_string(),
            local_path,
            filename: None,
            create_dirs: false,
        }
    }

    async fn store_with_five_files(failing: &str) -> MockObjectStore {
        let store = MockObjectStore::new("dev");
        for name in ["a", "b", "c", "d", "e"] {
            store
                .insert(&format!("osrm/processed/{}.osrm", name), name.as_bytes())
                .await;
        }
        store.fail_key(failing).await;
        store
    }

    #[tokio::test]
    async fn test_directory_download_with_one_failure_succeeds() {
        let temp = TempDir::new().unwrap();
        let store = store_with_five_files("osrm/processed/c.osrm").await;
        let transfer = Transfer::new(Arc::new(store));

        let report = run(&transfer, &request(Direction::Download, temp.path().join("out")))
            .await
            .unwrap();
        assert_eq!(report.transferred_count(), 4);
        assert_eq!(report.failed_count(), 1);
        assert!(!temp.path().join("out/c.osrm").exists());
    }

    #[tokio::test]
    async fn test_directory_upload_with_one_failure_succeeds() {
        let temp = TempDir::new().unwrap();
        for name in ["a", "b", "c", "d", "e"] {
            std::fs::write(temp.path().join(format!("{}.osrm", name)), name).unwrap();
        }
        let store = MockObjectStore::new("dev");
        store.fail_key("osrm/processed/b.osrm").await;
        let transfer = Transfer::new(Arc::new(store.clone()));

        let report = run(&transfer, &request(Direction::Upload, temp.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(report.transferred_count(), 4);
        assert!(store.exists("osrm/processed/e.osrm").await);
    }

    #[tokio::test]
    async fn test_empty_prefix_download_fails() {
        let temp = TempDir::new().unwrap();
        let transfer = Transfer::new(Arc::new(MockObjectStore::new("dev")));

        let err = run(&transfer, &request(Direction::Download, temp.path().join("out")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Nothing to download"));
    }

    #[tokio::test]
    async fn test_single_file_failure_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = store_with_five_files("osrm/processed/a.osrm").await;
        let transfer = Transfer::new(Arc::new(store));

        let mut req = request(Direction::Download, temp.path().to_path_buf());
        req.filename = Some("a.osrm".to_string());
        assert!(run(&transfer, &req).await.is_err());
    }

    #[tokio::test]
    async fn test_create_dirs_marks_folder_for_directory_upload_only() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.osrm"), b"a").unwrap();
        let store = MockObjectStore::new("dev");
        let transfer = Transfer::new(Arc::new(store.clone()));

        let mut req = request(Direction::Upload, temp.path().to_path_buf());
        req.create_dirs = true;
        req.filename = Some("a.osrm".to_string());
        run(&transfer, &req).await.unwrap();
        let marked = |calls: &[RecordedStoreCall]| {
            calls
                .iter()
                .any(|call| matches!(call, RecordedStoreCall::Marker { .. }))
        };
        assert!(!marked(&store.recorded_calls().await));

        req.filename = None;
        run(&transfer, &req).await.unwrap();
        assert!(marked(&store.recorded_calls().await));
    }
}
