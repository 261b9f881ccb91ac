use std::path::PathBuf;
use thiserror::Error;

use crate::credentials::CredentialError;
use crate::git::BackendError;

/// A failed sync run, tagged with the source it was running for.
#[derive(Error, Debug)]
#[error("source '{source_name}' ({repository}): {kind}")]
pub struct SyncError {
    pub source_name: String,
    pub repository: String,
    #[source]
    pub kind: SyncErrorKind,
}

impl SyncError {
    pub fn new(
        source_name: impl Into<String>,
        repository: impl Into<String>,
        kind: impl Into<SyncErrorKind>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            repository: repository.into(),
            kind: kind.into(),
        }
    }

    /// Returns true if the run stopped because its context was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, SyncErrorKind::Cancelled)
    }
}

#[derive(Error, Debug)]
pub enum SyncErrorKind {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[source] CredentialError),

    #[error("Authentication failed: {0}")]
    AuthNetwork(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Git backend error: {0}")]
    GitBackend(#[source] BackendError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Sync cancelled")]
    Cancelled,
}

impl From<CredentialError> for SyncErrorKind {
    fn from(err: CredentialError) -> Self {
        if err.is_auth_network() {
            SyncErrorKind::AuthNetwork(Box::new(err))
        } else {
            SyncErrorKind::Credential(err)
        }
    }
}

impl From<BackendError> for SyncErrorKind {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Cancelled => SyncErrorKind::Cancelled,
            err if err.is_auth() => SyncErrorKind::AuthNetwork(Box::new(err)),
            err => SyncErrorKind::GitBackend(err),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Neither reference nor commit is configured")]
    MissingRevision,

    #[error("Both reference '{reference}' and commit '{commit}' are configured")]
    ConflictingRevision { reference: String, commit: String },

    #[error("Invalid commit '{0}': expected 4 to 64 hexadecimal digits")]
    InvalidCommit(String),

    #[error("Invalid reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML in '{path}': {message}")]
    ParseYaml { path: PathBuf, message: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to read sync marker '{path}': {source}")]
    ReadMarker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write sync marker '{path}': {source}")]
    WriteMarker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode sync marker: {0}")]
    EncodeMarker(#[from] serde_json::Error),

    #[error("Failed to remove '{path}': {source}")]
    Wipe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;
