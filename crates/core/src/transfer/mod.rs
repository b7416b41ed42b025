//! Transfer layer between local directories and object store prefixes.
//!
//! Single-file operations fail on any error. Directory operations are
//! best-effort batches; callers decide what counts as success, usually at
//! least one transferred file.

mod error;
mod layer;

pub use error::TransferError;
pub use layer::Transfer;
