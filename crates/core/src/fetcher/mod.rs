//! Data fetcher for the raw map extract.
//!
//! [`HttpFetcher`] streams the configured URL to disk and, in remote storage
//! mode, moves the result into the object store under the raw prefix.

mod error;
mod http;
mod traits;
mod types;

pub use error::FetchError;
pub use http::HttpFetcher;
pub use traits::Fetcher;
pub use types::{ArtifactLocation, DatasetArtifact};
