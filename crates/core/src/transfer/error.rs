use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Local directory not found: {path}")]
    LocalDirNotFound { path: PathBuf },

    #[error("Listing {prefix} failed: {source}")]
    List {
        prefix: String,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
