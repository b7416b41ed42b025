//! In-memory object store for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::storage::{ObjectMetadata, ObjectStore, StorageError};

/// A recorded store call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedStoreCall {
    Upload { key: String },
    Download { key: String },
    Delete { key: String },
    Marker { key: String },
}

/// Mock implementation of the ObjectStore trait.
///
/// Objects are kept in memory. Keys registered with [`fail_key`] reject
/// uploads and downloads with a backend error.
///
/// [`fail_key`]: MockObjectStore::fail_key
#[derive(Debug, Clone)]
pub struct MockObjectStore {
    bucket: String,
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    failing_keys: Arc<RwLock<HashSet<String>>>,
    calls: Arc<RwLock<Vec<RecordedStoreCall>>>,
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new("dev")
    }
}

impl MockObjectStore {
    /// Create an empty store for `bucket`.
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            failing_keys: Arc::new(RwLock::new(HashSet::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Put an object directly, bypassing the recorded calls.
    pub async fn insert(&self, key: &str, data: impl Into<Vec<u8>>) {
        self.objects.write().await.insert(key.to_string(), data.into());
    }

    /// Contents of `key`, if present.
    pub async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Make uploads and downloads of `key` fail.
    pub async fn fail_key(&self, key: &str) {
        self.failing_keys.write().await.insert(key.to_string());
    }

    /// Get all recorded calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedStoreCall> {
        self.calls.read().await.clone()
    }

    /// Number of upload attempts, failed ones included.
    pub async fn upload_count(&self) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| matches!(c, RecordedStoreCall::Upload { .. }))
            .count()
    }

    async fn check_failing(&self, operation: &'static str, key: &str) -> Result<(), StorageError> {
        if self.failing_keys.read().await.contains(key) {
            return Err(StorageError::backend(operation, key, "simulated backend failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    fn name(&self) -> &str {
        "mock"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), StorageError> {
        self.calls.write().await.push(RecordedStoreCall::Upload {
            key: key.to_string(),
        });

        let data = match tokio::fs::read(local_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::SourceNotFound {
                    path: local_path.to_path_buf(),
                })
            }
            Err(e) => return Err(StorageError::Io(e)),
        };
        self.check_failing("upload", key).await?;

        self.objects.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<u64, StorageError> {
        self.calls.write().await.push(RecordedStoreCall::Download {
            key: key.to_string(),
        });
        self.check_failing("download", key).await?;

        let data = self
            .object(key)
            .await
            .ok_or_else(|| StorageError::NotFound {
                bucket: self.bucket.clone(),
                key: key.to_string(),
            })?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &data).await?;
        Ok(data.len() as u64)
    }

    async fn exists(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.calls.write().await.push(RecordedStoreCall::Delete {
            key: key.to_string(),
        });
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn metadata(&self, key: &str) -> Result<Option<ObjectMetadata>, StorageError> {
        Ok(self.object(key).await.map(|data| ObjectMetadata {
            key: key.to_string(),
            size: data.len() as u64,
            last_modified: Some(Utc::now()),
            etag: Some(format!("{:x}", md5::compute(&data))),
            content_type: None,
        }))
    }

    async fn put_marker(&self, key: &str) -> Result<(), StorageError> {
        self.calls.write().await.push(RecordedStoreCall::Marker {
            key: key.to_string(),
        });
        self.objects.write().await.insert(key.to_string(), Vec::new());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_then_download_round_trip() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("in.osrm");
        std::fs::write(&source, b"cells").unwrap();

        let store = MockObjectStore::new("dev");
        store.upload(&source, "osrm/processed/in.osrm").await.unwrap();

        let target = temp.path().join("out/in.osrm");
        let written = store.download("osrm/processed/in.osrm", &target).await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(std::fs::read(&target).unwrap(), b"cells");
    }

    #[tokio::test]
    async fn test_download_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = MockObjectStore::new("dev");
        let result = store.download("nope", &temp.path().join("nope")).await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_create_folder_appends_slash() {
        let store = MockObjectStore::new("dev");
        store.create_folder("osrm/raw").await.unwrap();
        store.create_folder("osrm/processed/").await.unwrap();
        assert_eq!(store.keys().await, vec!["osrm/processed/", "osrm/raw/"]);
    }
}
