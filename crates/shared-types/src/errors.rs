//! # Error Types
//!
//! Errors raised by the storage ports shared across crates.

use thiserror::Error;

/// Failure reported by a storage adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Requested entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend rejected or failed the operation.
    #[error("Storage backend error: {0}")]
    Backend(String),
}
