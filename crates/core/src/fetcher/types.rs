use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a fetched dataset ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactLocation {
    Local { path: PathBuf },
    Remote { bucket: String, key: String },
}

/// The raw map extract produced by a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetArtifact {
    pub filename: String,
    pub size_bytes: u64,
    pub location: ArtifactLocation,
}

impl DatasetArtifact {
    pub fn local_path(&self) -> Option<&PathBuf> {
        match &self.location {
            ArtifactLocation::Local { path } => Some(path),
            ArtifactLocation::Remote { .. } => None,
        }
    }

    pub fn remote_key(&self) -> Option<&str> {
        match &self.location {
            ArtifactLocation::Local { .. } => None,
            ArtifactLocation::Remote { key, .. } => Some(key),
        }
    }
}
