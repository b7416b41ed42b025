//! Mock fetcher for testing.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::MockObjectStore;
use crate::fetcher::{ArtifactLocation, DatasetArtifact, FetchError, Fetcher};
use crate::pipeline::StorageMode;
use crate::storage::ObjectStore;

/// Mock implementation of the Fetcher trait.
///
/// Local fetches write the payload to `local_path`; remote fetches put it
/// into the attached [`MockObjectStore`] at `remote_key`.
#[derive(Debug, Clone)]
pub struct MockFetcher {
    filename: String,
    local_path: PathBuf,
    remote_key: String,
    payload: Vec<u8>,
    store: Option<MockObjectStore>,
    next_error: Arc<RwLock<Option<FetchError>>>,
    fetches: Arc<RwLock<Vec<StorageMode>>>,
}

impl MockFetcher {
    /// Create a fetcher producing `filename` under `raw_dir` (local) or
    /// `raw_prefix` (remote).
    pub fn new(filename: &str, raw_dir: impl Into<PathBuf>, raw_prefix: &str) -> Self {
        Self {
            filename: filename.to_string(),
            local_path: raw_dir.into().join(filename),
            remote_key: crate::storage::join_key(raw_prefix, filename),
            payload: b"mock osm payload".to_vec(),
            store: None,
            next_error: Arc::new(RwLock::new(None)),
            fetches: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Attach the store remote fetches upload to.
    pub fn with_store(mut self, store: MockObjectStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Configure the next fetch to fail with the given error.
    pub async fn set_next_error(&self, error: FetchError) {
        *self.next_error.write().await = Some(error);
    }

    /// Modes of every fetch performed.
    pub async fn recorded_fetches(&self) -> Vec<StorageMode> {
        self.fetches.read().await.clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, mode: StorageMode) -> Result<DatasetArtifact, FetchError> {
        self.fetches.write().await.push(mode);
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        let location = match mode {
            StorageMode::Local => {
                if let Some(parent) = self.local_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&self.local_path, &self.payload).await?;
                ArtifactLocation::Local {
                    path: self.local_path.clone(),
                }
            }
            StorageMode::Remote => {
                let store = self.store.as_ref().ok_or(FetchError::NoStore)?;
                store.insert(&self.remote_key, self.payload.clone()).await;
                ArtifactLocation::Remote {
                    bucket: store.bucket().to_string(),
                    key: self.remote_key.clone(),
                }
            }
        };

        Ok(DatasetArtifact {
            filename: self.filename.clone(),
            size_bytes: self.payload.len() as u64,
            location,
        })
    }
}
