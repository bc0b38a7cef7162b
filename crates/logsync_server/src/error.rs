//! Error types for the sync server.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while handling sync requests.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request is malformed or missing required fields.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The requested mapping or content does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The API token is missing or wrong.
    #[error("unauthorized")]
    Unauthorized,

    /// Ledger or mapping persistence failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem failure.
    #[error("i/o error at {path}: {source}")]
    Io {
        /// The path the operation failed on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ServerError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Creates an I/O error for a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::Validation(_) => 400,
            ServerError::NotFound(_) => 404,
            ServerError::Unauthorized => 401,
            ServerError::Storage(_) | ServerError::Io { .. } => 500,
        }
    }

    /// Returns true if this is a missing-resource error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServerError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ServerError::validation("bad").status_code(), 400);
        assert_eq!(ServerError::not_found("x").status_code(), 404);
        assert_eq!(ServerError::Unauthorized.status_code(), 401);
        assert_eq!(ServerError::storage("disk").status_code(), 500);
    }

    #[test]
    fn not_found_predicate() {
        assert!(ServerError::not_found("mapping").is_not_found());
        assert!(!ServerError::validation("bad").is_not_found());
    }
}
