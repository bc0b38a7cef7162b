//! Error types for the sync client.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Invalid or missing configuration. Fatal, detected before any sync.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or transport failure. Fatal to the current graph's cycle
    /// when raised during setup/fetch; per-file otherwise.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
        /// HTTP status code, when the server answered at all.
        status: Option<u16>,
    },

    /// Unexpected response shape from the server.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local filesystem failure, scoped to a single path.
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        /// The path the operation failed on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Encryption or decryption failure, fatal to the single operation.
    #[error("encryption error: {0}")]
    Crypto(String),

    /// The server has no content for the requested file id.
    #[error("remote content not found for {0}")]
    NotFound(String),

    /// Snapshot persistence failure.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl SyncError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a network error without a status code.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status: None,
        }
    }

    /// Creates a network error from an unexpected HTTP status.
    pub fn status(status: u16) -> Self {
        Self::Network {
            message: format!("unexpected status code {status}"),
            status: Some(status),
        }
    }

    /// Creates a filesystem error for a path.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Creates an encryption error.
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto(message.into())
    }

    /// Creates a snapshot error.
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot(message.into())
    }

    /// Returns true if this is a missing-content error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
            || matches!(
                self,
                SyncError::Network {
                    status: Some(404),
                    ..
                }
            )
    }

    /// Returns true if the error should end the process with a non-zero
    /// exit code. Everything else is retried or skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Config(_))
    }
}
