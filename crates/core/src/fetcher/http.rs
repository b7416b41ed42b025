//! HTTP download of the raw map extract.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::error::FetchError;
use super::traits::Fetcher;
use super::types::{ArtifactLocation, DatasetArtifact};
use crate::config::DatasetConfig;
use crate::pipeline::StorageMode;
use crate::storage::{join_key, ObjectStore};

const USER_AGENT: &str = concat!("mapstage/", env!("CARGO_PKG_VERSION"));

/// Progress is logged every time this many more bytes arrive.
const PROGRESS_STEP_BYTES: u64 = 64 * 1024 * 1024;

/// Streams the configured URL to disk, then keeps it locally or moves it to
/// the object store.
pub struct HttpFetcher<S> {
    client: reqwest::Client,
    dataset: DatasetConfig,
    raw_dir: PathBuf,
    raw_prefix: String,
    store: Option<Arc<S>>,
}

impl<S: ObjectStore> HttpFetcher<S> {
    /// `raw_dir` is the local target in local mode; `raw_prefix` the key
    /// prefix in remote mode. `store` may be `None` for local-only use.
    pub fn new(
        dataset: DatasetConfig,
        raw_dir: impl Into<PathBuf>,
        raw_prefix: impl Into<String>,
        store: Option<Arc<S>>,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(dataset.connect_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            dataset,
            raw_dir: raw_dir.into(),
            raw_prefix: raw_prefix.into(),
            store,
        })
    }

    /// Downloads to `target` through a sibling `.part` file. Returns the size.
    async fn download_to(&self, target: &Path) -> Result<u64, FetchError> {
        let url = self.dataset.url.as_str();
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part = part_path(target);
        match self.stream_into(url, &part).await {
            Ok(0) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(FetchError::Empty {
                    url: url.to_string(),
                })
            }
            Ok(size) => {
                tokio::fs::rename(&part, target).await?;
                Ok(size)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn stream_into(&self, url: &str, part: &Path) -> Result<u64, FetchError> {
        let start = Instant::now();
        info!("Downloading {}", url);

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(part).await?;
        let mut written: u64 = 0;
        let mut next_report = PROGRESS_STEP_BYTES;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::transport(url, e))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if written >= next_report {
                match total {
                    Some(total) if total > 0 => debug!(
                        "Downloaded {} of {} bytes ({:.1}%)",
                        written,
                        total,
                        written as f64 / total as f64 * 100.0
                    ),
                    _ => debug!("Downloaded {} bytes", written),
                }
                next_report += PROGRESS_STEP_BYTES;
            }
        }

        file.flush().await?;
        file.sync_all().await?;

        info!(
            "Downloaded {} bytes from {} in {:.1}s",
            written,
            url,
            start.elapsed().as_secs_f64()
        );
        Ok(written)
    }

    async fn fetch_local(&self) -> Result<DatasetArtifact, FetchError> {
        let target = self.raw_dir.join(&self.dataset.filename);
        let size = self.download_to(&target).await?;
        info!("Dataset stored at {}", target.display());

        Ok(DatasetArtifact {
            filename: self.dataset.filename.clone(),
            size_bytes: size,
            location: ArtifactLocation::Local { path: target },
        })
    }

    async fn fetch_remote(&self) -> Result<DatasetArtifact, FetchError> {
        let store = self.store.as_ref().ok_or(FetchError::NoStore)?;

        let staging = tempfile::Builder::new()
            .prefix("mapstage-download-")
            .tempdir()?;
        let local = staging.path().join(&self.dataset.filename);
        let size = self.download_to(&local).await?;

        let key = join_key(&self.raw_prefix, &self.dataset.filename);
        if store.exists(&key).await {
            info!("Replacing existing object {}/{}", store.bucket(), key);
        }

        if let Err(e) = store.upload(&local, &key).await {
            warn!("Upload of {} failed, discarding local copy", local.display());
            let _ = tokio::fs::remove_file(&local).await;
            return Err(e.into());
        }

        debug!("Removing staging directory {}", staging.path().display());
        if let Err(e) = staging.close() {
            warn!("Could not remove staging directory: {}", e);
        }

        Ok(DatasetArtifact {
            filename: self.dataset.filename.clone(),
            size_bytes: size,
            location: ArtifactLocation::Remote {
                bucket: store.bucket().to_string(),
                key,
            },
        })
    }
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}

#[async_trait]
impl<S: ObjectStore> Fetcher for HttpFetcher<S> {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, mode: StorageMode) -> Result<DatasetArtifact, FetchError> {
        match mode {
            StorageMode::Local => self.fetch_local().await,
            StorageMode::Remote => self.fetch_remote().await,
        }
    }
}
