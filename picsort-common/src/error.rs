//! Common error types for PicSort

use thiserror::Error;

/// Common result type for PicSort operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across PicSort crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or invalid configuration. Fatal, never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found (event, photo, person, collection)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected before any external call was made
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Uniqueness or ownership conflict (duplicate storage key, conflicting link)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Call to the recognition oracle or object store failed
    #[error("{service} call failed: {message}")]
    External {
        service: &'static str,
        message: String,
    },

    /// Caller cancelled the operation before it completed
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an `External` error from any displayable failure
    pub fn external(service: &'static str, err: impl std::fmt::Display) -> Self {
        Error::External {
            service,
            message: err.to_string(),
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::External { .. })
    }

    /// Map a unique-constraint violation to `Conflict`, passing other errors through
    pub fn from_insert(err: sqlx::Error, what: impl std::fmt::Display) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Error::Conflict(format!("{} already exists", what))
            }
            _ => Error::Database(err),
        }
    }
}
