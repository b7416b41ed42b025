//! Trait definitions for the storage module.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::error::StorageError;
use super::types::{join_key, BatchReport, ObjectMetadata};

/// An S3-compatible object store.
///
/// Writes are last-writer-wins; callers assume they are the only writer
/// under the prefixes they touch.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the name of this store implementation.
    fn name(&self) -> &str;

    /// The bucket every key is relative to.
    fn bucket(&self) -> &str;

    /// Uploads a local file, replacing any existing object at `key`.
    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), StorageError>;

    /// Downloads `key` to `local_path`, creating parent directories.
    ///
    /// Returns the number of bytes written. No partial file is left behind
    /// on failure.
    async fn download(&self, key: &str, local_path: &Path) -> Result<u64, StorageError>;

    /// Whether `key` exists. Backend errors read as `false`.
    async fn exists(&self, key: &str) -> bool;

    /// Every key under `prefix`, across all result pages.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Metadata for `key`, or `None` when it does not exist.
    async fn metadata(&self, key: &str) -> Result<Option<ObjectMetadata>, StorageError>;

    /// Creates the zero-byte `prefix/` marker object.
    async fn create_folder(&self, prefix: &str) -> Result<(), StorageError> {
        let key = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{}/", prefix)
        };
        self.put_marker(&key).await
    }

    /// Writes an empty object at `key`.
    async fn put_marker(&self, key: &str) -> Result<(), StorageError>;

    /// Uploads every regular file below `local_dir` to `prefix`, keeping
    /// relative paths. Failures are collected; the walk never stops early.
    async fn upload_directory(&self, local_dir: &Path, prefix: &str) -> BatchReport {
        let mut report = BatchReport::default();

        let files = match local_files(local_dir).await {
            Ok(files) => files,
            Err(e) => {
                warn!("Cannot read {}: {}", local_dir.display(), e);
                report.record_failure(local_dir.display().to_string(), e);
                return report;
            }
        };

        for (path, relative) in files {
            let key = join_key(prefix, &relative);
            let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
            match self.upload(&path, &key).await {
                Ok(()) => report.record_success(key, path, size),
                Err(e) => {
                    warn!("Failed to upload {}: {}", path.display(), e);
                    report.record_failure(path.display().to_string(), e);
                }
            }
        }

        info!(
            "Uploaded {} files ({} bytes) from {} to {}/{}, {} failed",
            report.transferred_count(),
            report.total_bytes(),
            local_dir.display(),
            self.bucket(),
            prefix,
            report.failed_count()
        );
        report
    }
}

/// Lists regular files below `root` with their `/`-separated relative paths,
/// sorted. Symlinks are skipped.
pub async fn local_files(root: &Path) -> std::io::Result<Vec<(PathBuf, String)>> {
    if !tokio::fs::metadata(root).await?.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            format!("{} is not a directory", root.display()),
        ));
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .map(|rel| {
                        rel.components()
                            .map(|c| c.as_os_str().to_string_lossy())
                            .collect::<Vec<_>>()
                            .join("/")
                    })
                    .unwrap_or_else(|_| entry.file_name().to_string_lossy().to_string());
                files.push((path, relative));
            }
        }
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_files_walks_recursively() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("nested/deeper")).unwrap();
        std::fs::write(root.join("b.osrm"), b"b").unwrap();
        std::fs::write(root.join("nested/a.osrm"), b"a").unwrap();
        std::fs::write(root.join("nested/deeper/c.osrm"), b"c").unwrap();

        let files = local_files(root).await.unwrap();
        let relative: Vec<_> = files.iter().map(|(_, rel)| rel.as_str()).collect();
        assert_eq!(relative, vec!["b.osrm", "nested/a.osrm", "nested/deeper/c.osrm"]);
    }

    #[tokio::test]
    async fn test_local_files_rejects_missing_root() {
        let temp = TempDir::new().unwrap();
        assert!(local_files(&temp.path().join("missing")).await.is_err());

        let file = temp.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(local_files(&file).await.is_err());
    }
}
