//! Object store client.
//!
//! The [`ObjectStore`] trait is the contract the rest of the crate expects
//! from an S3-compatible bucket; [`S3ObjectStore`] implements it with the AWS
//! SDK. Single-file operations return typed errors; directory uploads are
//! best-effort and report per-file results in a [`BatchReport`].

mod error;
mod s3;
mod traits;
mod types;

pub use error::StorageError;
pub use s3::{normalize_endpoint, S3ObjectStore};
pub use traits::{local_files, ObjectStore};
pub use types::{join_key, BatchReport, ObjectMetadata, TransferFailure, TransferredItem};
