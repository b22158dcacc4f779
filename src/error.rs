//! Error types for filebox.

use thiserror::Error;

/// Coarse classification of an error, for callers that map failures onto a
/// transport (HTTP status codes, exit codes, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input.
    Validation,
    /// Absent, or not visible to the caller.
    NotFound,
    /// Pre-flight or conditional quota check failed.
    QuotaExceeded,
    /// Caller is known to see the resource but may not change it.
    Forbidden,
    /// Storage or configuration failure.
    Internal,
}

/// Common error type for filebox.
#[derive(Error, Debug)]
pub enum FileboxError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    ///
    /// Also returned when the resource exists but is not visible to the
    /// caller, so that existence is never leaked.
    #[error("{0} not found")]
    NotFound(String),

    /// Storage quota would be exceeded.
    #[error("storage quota exceeded: requested {requested} bytes, {available} available")]
    QuotaExceeded {
        /// Bytes the caller asked for.
        requested: i64,
        /// Bytes left under the limit at the time of the check.
        available: i64,
    },

    /// Permission denied on a resource the caller can already see.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl FileboxError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FileboxError::Validation(_) => ErrorKind::Validation,
            FileboxError::NotFound(_) => ErrorKind::NotFound,
            FileboxError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            FileboxError::Forbidden(_) => ErrorKind::Forbidden,
            FileboxError::Database(_) | FileboxError::Io(_) | FileboxError::Config(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<sqlx::Error> for FileboxError {
    fn from(e: sqlx::Error) -> Self {
        FileboxError::Database(e.to_string())
    }
}

/// Result type alias for filebox operations.
pub type Result<T> = std::result::Result<T, FileboxError>;
