//! Error types for the fetcher module.

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Download from {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Download from {url} produced no data")]
    Empty { url: String },

    #[error("Remote storage mode requires a configured object store")]
    NoStore,

    #[error("Upload of downloaded dataset failed: {0}")]
    Upload(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn transport(url: &str, reason: impl ToString) -> Self {
        Self::Transport {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
