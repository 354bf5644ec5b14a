//! Error types for lrustore and lrucache

use std::io;
use thiserror::Error;

/// Result type alias for store and cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for store and cache operations
#[derive(Debug, Error)]
pub enum Error {
    /// Key not found
    #[error("Key not found")]
    NotFound,

    /// Capacity must be greater than zero
    #[error("Invalid capacity: {0} (must be greater than 0)")]
    InvalidCapacity(usize),

    /// I/O error from a file-backed store
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Opaque error raised by a store implementation or an eviction callback
    #[error("Backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap any error as [`Error::Backend`]
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Backend(err.into())
    }

    /// Whether this error reports a missing key
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}
