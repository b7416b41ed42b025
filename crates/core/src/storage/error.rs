//! Error types for the storage module.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Endpoint, access key or secret key is missing.
    #[error("Missing storage setting: {0}")]
    MissingCredential(&'static str),

    #[error("Local file not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Storage backend error during {operation} of {key}: {reason}")]
    Backend {
        operation: &'static str,
        key: String,
        reason: String,
    },

    #[error("Upload of {key} failed verification: local md5 {expected}, remote etag {actual}")]
    IntegrityMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn backend(operation: &'static str, key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Backend {
            operation,
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
