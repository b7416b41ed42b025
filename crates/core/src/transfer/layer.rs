//! Directory and single-file transfers between the local layout and key
//! prefixes in the object store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::TransferError;
use crate::storage::{join_key, BatchReport, ObjectStore};

/// Moves files between local directories and key prefixes of one store.
pub struct Transfer<S> {
    store: Arc<S>,
}

impl<S> Clone for Transfer<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: ObjectStore> Transfer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Downloads from `remote_prefix` into `local_dir`.
    ///
    /// With `filename`, exactly `<prefix>/<filename>` is fetched and any
    /// failure is an error. Without it every key under the prefix is
    /// mirrored; per-file failures are collected in the report.
    pub async fn pull(
        &self,
        remote_prefix: &str,
        local_dir: &Path,
        filename: Option<&str>,
    ) -> Result<BatchReport, TransferError> {
        tokio::fs::create_dir_all(local_dir).await?;
        let mut report = BatchReport::default();

        if let Some(filename) = filename {
            let key = join_key(remote_prefix, filename);
            let target = local_dir.join(filename);
            let bytes = self.store.download(&key, &target).await?;
            report.record_success(key, target, bytes);
            return Ok(report);
        }

        let prefix = format!("{}/", remote_prefix.trim_end_matches('/'));
        let keys = self
            .store
            .list(&prefix)
            .await
            .map_err(|source| TransferError::List {
                prefix: prefix.clone(),
                source,
            })?;

        for key in keys {
            let Some(relative) = key.strip_prefix(&prefix) else {
                continue;
            };
            // Folder markers
            if relative.is_empty() || relative.ends_with('/') {
                continue;
            }

            let target = relative_target(local_dir, relative);
            match self.store.download(&key, &target).await {
                Ok(bytes) => report.record_success(key, target, bytes),
                Err(e) => {
                    warn!("Failed to download {}: {}", key, e);
                    report.record_failure(key, e);
                }
            }
        }

        info!(
            "Downloaded {} files ({} bytes) from {}/{} to {}, {} failed",
            report.transferred_count(),
            report.total_bytes(),
            self.store.bucket(),
            prefix,
            local_dir.display(),
            report.failed_count()
        );
        Ok(report)
    }

    /// Uploads `local_dir` (or the single `filename` inside it) to
    /// `remote_prefix`. A missing directory or named file is an error.
    pub async fn push(
        &self,
        local_dir: &Path,
        remote_prefix: &str,
        filename: Option<&str>,
    ) -> Result<BatchReport, TransferError> {
        let is_dir = tokio::fs::metadata(local_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(TransferError::LocalDirNotFound {
                path: local_dir.to_path_buf(),
            });
        }

        if let Some(filename) = filename {
            let source = local_dir.join(filename);
            let key = join_key(remote_prefix, filename);
            let bytes = tokio::fs::metadata(&source)
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            self.store.upload(&source, &key).await?;

            let mut report = BatchReport::default();
            report.record_success(key, source, bytes);
            return Ok(report);
        }

        Ok(self.store.upload_directory(local_dir, remote_prefix).await)
    }

    /// Creates the folder marker for `prefix`.
    pub async fn create_folder(&self, prefix: &str) -> Result<(), TransferError> {
        Ok(self.store.create_folder(prefix).await?)
    }
}

/// Local path for a `/`-separated key suffix, ignoring `.` and `..` parts.
fn relative_target(local_dir: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .fold(local_dir.to_path_buf(), |path, part| path.join(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use crate::testing::MockObjectStore;
    use tempfile::TempDir;

    fn transfer(store: &MockObjectStore) -> Transfer<MockObjectStore> {
        Transfer::new(Arc::new(store.clone()))
    }

    #[test]
    fn test_relative_target_stays_inside() {
        let base = Path::new("/data/processed");
        assert_eq!(
            relative_target(base, "a/b.osrm"),
            PathBuf::from("/data/processed/a/b.osrm")
        );
        assert_eq!(
            relative_target(base, "../../etc/passwd"),
            PathBuf::from("/data/processed/etc/passwd")
        );
    }

    #[tokio::test]
    async fn test_pull_single_file() {
        let temp = TempDir::new().unwrap();
        let store = MockObjectStore::new("dev");
        store.insert("osrm/raw/monaco.osm.pbf", b"pbf".to_vec()).await;

        let report = transfer(&store)
            .pull("osrm/raw", &temp.path().join("raw"), Some("monaco.osm.pbf"))
            .await
            .unwrap();
        assert_eq!(report.transferred_count(), 1);
        assert_eq!(
            std::fs::read(temp.path().join("raw/monaco.osm.pbf")).unwrap(),
            b"pbf"
        );
    }

    #[tokio::test]
    async fn test_pull_single_missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        let store = MockObjectStore::new("dev");

        let result = transfer(&store)
            .pull("osrm/raw", temp.path(), Some("monaco.osm.pbf"))
            .await;
        assert!(matches!(
            result,
            Err(TransferError::Storage(StorageError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_pull_directory_mirrors_and_skips_failures() {
        let temp = TempDir::new().unwrap();
        let store = MockObjectStore::new("dev");
        store.insert("osrm/processed/", Vec::new()).await;
        store.insert("osrm/processed/a.osrm.cells", b"a".to_vec()).await;
        store.insert("osrm/processed/sub/b.osrm.ebg", b"bb".to_vec()).await;
        store.insert("osrm/processed/broken.osrm", b"x".to_vec()).await;
        store.insert("osrm/processed-other/c", b"c".to_vec()).await;
        store.fail_key("osrm/processed/broken.osrm").await;

        let local = temp.path().join("processed");
        let report = transfer(&store)
            .pull("osrm/processed", &local, None)
            .await
            .unwrap();

        assert_eq!(report.transferred_count(), 2);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.total_bytes(), 3);
        assert!(local.join("a.osrm.cells").is_file());
        assert!(local.join("sub/b.osrm.ebg").is_file());
        assert!(!local.join("c").exists());
    }

    #[tokio::test]
    async fn test_push_directory_with_one_broken_file() {
        let temp = TempDir::new().unwrap();
        let local = temp.path().join("processed");
        std::fs::create_dir_all(&local).unwrap();
        for i in 0..5 {
            std::fs::write(local.join(format!("part{}.osrm", i)), b"data").unwrap();
        }

        let store = MockObjectStore::new("dev");
        store.fail_key("osrm/processed/part2.osrm").await;

        let report = transfer(&store)
            .push(&local, "osrm/processed", None)
            .await
            .unwrap();

        assert_eq!(report.transferred_count(), 4);
        assert_eq!(report.failed_count(), 1);
        assert!(report.failures[0].item.ends_with("part2.osrm"));
        assert!(store.exists("osrm/processed/part4.osrm").await);
        assert!(!store.exists("osrm/processed/part2.osrm").await);
    }

    #[tokio::test]
    async fn test_push_missing_directory() {
        let temp = TempDir::new().unwrap();
        let store = MockObjectStore::new("dev");
        let result = transfer(&store)
            .push(&temp.path().join("missing"), "osrm/processed", None)
            .await;
        assert!(matches!(result, Err(TransferError::LocalDirNotFound { .. })));
    }

    #[tokio::test]
    async fn test_push_from_a_file_path_is_rejected() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not-a-dir.osrm");
        std::fs::write(&file, b"x").unwrap();
        let store = MockObjectStore::new("dev");

        let result = transfer(&store).push(&file, "osrm/processed", None).await;
        assert!(matches!(result, Err(TransferError::LocalDirNotFound { .. })));
        assert_eq!(store.upload_count().await, 0);
    }

    #[tokio::test]
    async fn test_push_single_missing_file() {
        let temp = TempDir::new().unwrap();
        let store = MockObjectStore::new("dev");
        let result = transfer(&store)
            .push(temp.path(), "osrm/raw", Some("missing.osm.pbf"))
            .await;
        assert!(matches!(
            result,
            Err(TransferError::Storage(StorageError::SourceNotFound { .. }))
        ));
    }
}
