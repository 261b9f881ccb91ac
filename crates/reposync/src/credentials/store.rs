//! Typed secrets declared in the configuration file.

use std::collections::BTreeMap;

use super::error::{CredentialError, Result};
use super::provider::TypedSecretResolver;
use super::spec::CredentialSpec;
use crate::config::SecretSpec;
use crate::context::SyncContext;
use crate::secrets::SecretSource;

/// Resolves credentials from the `secrets` section of the configuration.
///
/// Secret values are read from their file or environment variable each time
/// a credential is resolved, so rotated files are picked up on the next run.
#[derive(Debug, Clone, Default)]
pub struct ConfigSecretStore {
    secrets: BTreeMap<String, SecretSpec>,
}

impl ConfigSecretStore {
    pub fn new(secrets: BTreeMap<String, SecretSpec>) -> Self {
        Self { secrets }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.secrets.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl TypedSecretResolver for ConfigSecretStore {
    fn resolve(&self, _ctx: &SyncContext, name: &str) -> Result<CredentialSpec> {
        let spec = self.secrets.get(name).ok_or_else(|| CredentialError::Lookup {
            name: name.to_string(),
            source: format!("no secret named '{}' is configured", name).into(),
        })?;

        let resolved = match spec {
            SecretSpec::BasicAuth {
                user,
                password,
                headers,
            } => CredentialSpec::BasicAuth {
                username: user.clone().unwrap_or_default(),
                password: password.resolve()?,
                headers: headers.clone(),
            },
            SecretSpec::GithubApp {
                integration_id,
                installation_id,
                private_key,
            } => CredentialSpec::GitHubApp {
                integration_id: *integration_id,
                installation_id: *installation_id,
                private_key_path: private_key.clone(),
            },
            SecretSpec::SshKey {
                key,
                passphrase,
                fingerprints,
            } => {
                if fingerprints.is_empty() {
                    return Err(CredentialError::invalid(name, "fingerprints", "must not be empty"));
                }
                CredentialSpec::SshKey {
                    key: key.resolve()?,
                    passphrase: passphrase
                        .as_ref()
                        .filter(|p| p.is_configured())
                        .map(SecretSource::resolve)
                        .transpose()?,
                    fingerprints: fingerprints.clone(),
                }
            }
            SecretSpec::OidcClientCredentials {
                token_url,
                client_id,
                client_secret,
                scopes,
            } => CredentialSpec::OidcClientCredentials {
                token_url: token_url.clone(),
                client_id: client_id.clone(),
                client_secret: client_secret.resolve()?,
                scopes: scopes.clone(),
            },
            SecretSpec::Token { token } => CredentialSpec::Token {
                token: token.resolve()?,
            },
        };
        Ok(resolved)
    }
}
