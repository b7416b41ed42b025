use async_trait::async_trait;

use super::error::FetchError;
use super::types::DatasetArtifact;
use crate::pipeline::StorageMode;

/// Obtains the raw dataset and places it according to the storage mode.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Returns the name of this fetcher implementation.
    fn name(&self) -> &str;

    /// Downloads the dataset. In remote mode the local copy is discarded
    /// after a successful upload.
    async fn fetch(&self, mode: StorageMode) -> Result<DatasetArtifact, FetchError>;
}
