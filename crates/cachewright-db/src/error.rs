//! Error types for database operations.

use thiserror::Error;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Native DB error.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be turned back into a domain value.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Row not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate key.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for cachewright_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(what) => cachewright_core::Error::NotFound(what),
            other => cachewright_core::Error::Storage(other.to_string()),
        }
    }
}
