//! Authentication error types.

use thiserror::Error;

/// Errors raised while building or applying an authentication strategy.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("SSH host key fingerprint allowlist is empty")]
    EmptyFingerprintAllowlist,

    #[error("Invalid SSH host key fingerprint '{0}'")]
    InvalidFingerprint(String),

    #[error("Host key {fingerprint} does not match any pinned fingerprint")]
    HostKeyMismatch { fingerprint: String },

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Failed to decrypt private key: {0}")]
    Decrypt(String),

    #[error("Invalid header '{0}', expected 'Name: value'")]
    InvalidHeader(String),

    #[error("Token endpoint {endpoint} failed: {message}")]
    TokenEndpoint { endpoint: String, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token cache lock poisoned")]
    CachePoisoned,

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
