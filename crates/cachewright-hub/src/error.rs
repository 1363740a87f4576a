//! Error types for cachewright-hub

use thiserror::Error;

/// Result type for cachewright-hub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cachewright-hub
///
/// Soft validation problems are not errors; they come back in the
/// outcome of an edit. Everything here aborts the request.
#[derive(Debug, Error)]
pub enum Error {
    /// Rule violation or bad request detected by the validators
    #[error(transparent)]
    Core(#[from] cachewright_core::Error),

    /// Storage failure
    #[error("database error: {0}")]
    Db(#[from] cachewright_db::Error),

    /// Site definitions could not be loaded
    #[error("site definition error: {0}")]
    Script(#[from] cachewright_script::Error),
}

impl Error {
    /// The validator error, if this is one
    pub fn core(&self) -> Option<&cachewright_core::Error> {
        match self {
            Error::Core(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the log operation was refused by a publication rule
    pub fn is_cannot_publish(&self) -> bool {
        self.core().is_some_and(|e| e.is_cannot_publish())
    }
}

// Compile-time check that Error is Send + Sync for thread-safe error propagation.
// This function is never called but will fail to compile if the bound is not satisfied.
fn _assert_error_send_sync<T: Send + Sync>() {}
fn _error_is_send_sync() {
    _assert_error_send_sync::<Error>();
}
