//! Error types for cachewright-core
//!
//! Hard failures only. Soft validation problems never travel through this
//! type; they accumulate in [`Problems`](crate::Problems).

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A required request parameter was not supplied
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// A parameter is malformed or outside its domain
    #[error("Invalid parameter '{param}'{}", reason_suffix(.reason))]
    InvalidParameter {
        /// Parameter name
        param: String,
        /// Optional human-readable reason
        reason: Option<String>,
    },

    /// A log entry violates a publication rule
    #[error("Cannot publish: {0}")]
    CannotPublish(String),

    /// The actor may not touch this object
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Cross-entity integrity violation; never recoverable
    #[error("Consistency fault: {0}")]
    ConsistencyFault(String),

    /// Referenced object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failure reported by the backing store
    #[error("Storage error: {0}")]
    Storage(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!(": {}", r),
        None => String::new(),
    }
}

impl Error {
    /// Invalid parameter without further explanation
    pub fn invalid(param: impl Into<String>) -> Self {
        Error::InvalidParameter {
            param: param.into(),
            reason: None,
        }
    }

    /// Invalid parameter with a reason
    pub fn invalid_because(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            param: param.into(),
            reason: Some(reason.into()),
        }
    }

    /// Whether this error blocks a log publication (as opposed to a request error)
    pub fn is_cannot_publish(&self) -> bool {
        matches!(self, Error::CannotPublish(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
