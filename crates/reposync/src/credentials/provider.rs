//! Caller-supplied secret lookup boundaries.

use serde_json::{Map, Value};

use super::error::Result;
use super::spec::CredentialSpec;
use crate::context::SyncContext;

/// Generic secret storage returning untyped attribute maps.
///
/// The returned map must contain a `type` attribute naming the credential
/// type; see [`CredentialSpec::from_attributes`] for the fields each type
/// takes.
pub trait SecretProvider: Send + Sync {
    fn get_secret(
        &self,
        ctx: &SyncContext,
        name: &str,
    ) -> std::result::Result<Map<String, Value>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Secret storage that already knows the credential types.
pub trait TypedSecretResolver: Send + Sync {
    /// Resolves the named secret, materializing its secret values.
    fn resolve(&self, ctx: &SyncContext, name: &str) -> Result<CredentialSpec>;
}
