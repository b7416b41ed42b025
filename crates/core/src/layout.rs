//! Local directory skeleton shared by every stage.
//!
//! Three directories live under one root: `raw` (downloaded extract),
//! `intermediate` (extract output) and `processed` (server-ready files).

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::config::LayoutConfig;

/// Resolved local directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    raw: PathBuf,
    intermediate: PathBuf,
    processed: PathBuf,
}

/// Outcome of clearing the local directories.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub bytes_removed: u64,
    pub errors: Vec<String>,
}

impl CleanupReport {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

impl DataLayout {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            raw: config.root.join(&config.raw),
            intermediate: config.root.join(&config.intermediate),
            processed: config.root.join(&config.processed),
        }
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw
    }

    pub fn intermediate_dir(&self) -> &Path {
        &self.intermediate
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed
    }

    pub fn dirs(&self) -> [&Path; 3] {
        [&self.raw, &self.intermediate, &self.processed]
    }

    /// Creates any missing directory of the skeleton.
    pub async fn ensure(&self) -> std::io::Result<()> {
        for dir in self.dirs() {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Removes every regular file directly inside the three directories and
    /// leaves the directories themselves in place.
    ///
    /// A file that cannot be removed is recorded and skipped.
    pub async fn clear_files(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for dir in self.dirs() {
            if dir.is_dir() {
                match fs::read_dir(dir).await {
                    Ok(mut entries) => loop {
                        let entry = match entries.next_entry().await {
                            Ok(Some(entry)) => entry,
                            Ok(None) => break,
                            Err(e) => {
                                report
                                    .errors
                                    .push(format!("Failed to read {}: {}", dir.display(), e));
                                break;
                            }
                        };

                        let path = entry.path();
                        let meta = match entry.metadata().await {
                            Ok(meta) if meta.is_file() => meta,
                            _ => continue,
                        };

                        match fs::remove_file(&path).await {
                            Ok(()) => {
                                report.files_removed += 1;
                                report.bytes_removed += meta.len();
                                info!("Removed: {} ({} bytes)", path.display(), meta.len());
                            }
                            Err(e) => {
                                warn!("Could not remove {}: {}", path.display(), e);
                                report
                                    .errors
                                    .push(format!("Failed to remove {}: {}", path.display(), e));
                            }
                        }
                    },
                    Err(e) => report
                        .errors
                        .push(format!("Failed to read {}: {}", dir.display(), e)),
                }
            }

            if let Err(e) = fs::create_dir_all(dir).await {
                report
                    .errors
                    .push(format!("Failed to recreate {}: {}", dir.display(), e));
            }
        }

        report
    }
}
