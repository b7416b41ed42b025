//! Types for the storage module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
}

/// One file moved between local disk and the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferredItem {
    pub key: String,
    pub local_path: PathBuf,
    pub bytes: u64,
}

/// One file that could not be moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFailure {
    pub item: String,
    pub reason: String,
}

/// Outcome of a best-effort directory transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub transferred: Vec<TransferredItem>,
    pub failures: Vec<TransferFailure>,
}

impl BatchReport {
    pub fn record_success(&mut self, key: impl Into<String>, local_path: impl Into<PathBuf>, bytes: u64) {
        self.transferred.push(TransferredItem {
            key: key.into(),
            local_path: local_path.into(),
            bytes,
        });
    }

    pub fn record_failure(&mut self, item: impl Into<String>, reason: impl ToString) {
        self.failures.push(TransferFailure {
            item: item.into(),
            reason: reason.to_string(),
        });
    }

    pub fn transferred_count(&self) -> usize {
        self.transferred.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.transferred.iter().map(|item| item.bytes).sum()
    }

    /// At least one item moved.
    pub fn any_transferred(&self) -> bool {
        !self.transferred.is_empty()
    }

    /// Every attempted item moved.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Joins a key prefix and a relative path with exactly one `/`.
pub fn join_key(prefix: &str, rest: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    if prefix.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", prefix, rest)
    }
}
