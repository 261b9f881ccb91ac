//! Credential resolution error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::auth::AuthError;
use crate::secrets::SecretError;

/// Errors that can occur while turning a credential reference into an
/// authentication strategy.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential '{0}' is referenced but no secret provider or resolver is configured")]
    NoResolver(String),

    #[error("Failed to look up credential '{name}': {source}")]
    Lookup {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Credential '{0}' has no 'type' attribute")]
    MissingType(String),

    #[error("Credential '{name}' has unsupported type '{kind}'")]
    UnsupportedType { name: String, kind: String },

    #[error("Credential '{name}' is missing required field '{field}'")]
    MissingField { name: String, field: &'static str },

    #[error("Credential '{name}' has invalid field '{field}': {reason}")]
    InvalidField {
        name: String,
        field: &'static str,
        reason: String,
    },

    #[error("Credential secret could not be resolved: {0}")]
    Secret(#[from] SecretError),

    #[error("Credential '{name}' could not be turned into a {kind} strategy: {source}")]
    Strategy {
        name: String,
        kind: &'static str,
        #[source]
        source: AuthError,
    },

    #[error("Failed to read private key '{path}' for credential '{name}': {source}")]
    ReadKey {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CredentialError {
    pub(crate) fn missing(name: &str, field: &'static str) -> Self {
        CredentialError::MissingField {
            name: name.to_string(),
            field,
        }
    }

    pub(crate) fn invalid(name: &str, field: &'static str, reason: impl Into<String>) -> Self {
        CredentialError::InvalidField {
            name: name.to_string(),
            field,
            reason: reason.into(),
        }
    }

    /// Returns true if the failure came from a network call (a token
    /// endpoint or host-key check) rather than from the configuration.
    pub fn is_auth_network(&self) -> bool {
        matches!(
            self,
            CredentialError::Strategy {
                source: AuthError::TokenEndpoint { .. }
                    | AuthError::Http(_)
                    | AuthError::HostKeyMismatch { .. },
                ..
            }
        )
    }
}

/// Result type for credential resolution.
pub type Result<T> = std::result::Result<T, CredentialError>;
