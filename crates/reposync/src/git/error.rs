//! Git backend error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a git backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("No git repository at '{0}'")]
    RepositoryNotFound(PathBuf),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Already up to date")]
    AlreadyUpToDate,

    #[error("Git operation cancelled")]
    Cancelled,

    #[error("Git authentication failed: {0}")]
    Authentication(String),

    #[error("SSH host key rejected: {0}")]
    HostKeyRejected(String),

    #[error("Git network error: {0}")]
    Network(String),

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Git operation failed: {0}")]
    Operation(String),
}

impl BackendError {
    /// Returns true for failures of the authentication handshake.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            BackendError::Authentication(_) | BackendError::HostKeyRejected(_)
        )
    }
}

/// Classifies a libgit2 error message when the error code alone is not
/// specific enough.
pub fn classify_message(message: &str) -> BackendError {
    let lower = message.to_lowercase();

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("failed to connect")
        || lower.contains("unexpected eof")
    {
        return BackendError::Network(message.trim().to_string());
    }

    if lower.contains("authentication")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
        || lower.contains("status code: 401")
        || lower.contains("status code: 403")
    {
        return BackendError::Authentication(message.trim().to_string());
    }

    BackendError::Operation(message.trim().to_string())
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;
