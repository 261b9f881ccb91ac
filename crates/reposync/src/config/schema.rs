use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::git::DEFAULT_SUBMODULE_DEPTH;
use crate::secrets::SecretSource;
use crate::sync::SyncTarget;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretSpec>,
}

/// Settings shared by every source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// GitHub API base URL for GitHub App tokens (GitHub Enterprise).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_api_base: Option<String>,
    #[serde(default = "default_submodule_depth")]
    pub submodule_depth: u32,
}

fn default_submodule_depth() -> u32 {
    DEFAULT_SUBMODULE_DEPTH
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            github_api_base: None,
            submodule_depth: DEFAULT_SUBMODULE_DEPTH,
        }
    }
}

/// One repository to keep in sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    pub name: String,
    pub path: PathBuf,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

impl SourceSpec {
    /// The sync target this source describes.
    pub fn target(&self) -> SyncTarget {
        SyncTarget {
            path: self.path.clone(),
            url: self.url.clone(),
            reference: self.reference.clone(),
            commit: self.commit.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

/// A typed credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SecretSpec {
    BasicAuth {
        #[serde(default)]
        user: Option<String>,
        password: SecretSource,
        #[serde(default)]
        headers: Vec<String>,
    },
    GithubApp {
        integration_id: u64,
        installation_id: u64,
        /// Path to the PEM-encoded app private key.
        private_key: PathBuf,
    },
    SshKey {
        key: SecretSource,
        #[serde(default)]
        passphrase: Option<SecretSource>,
        #[serde(default)]
        fingerprints: Vec<String>,
    },
    OidcClientCredentials {
        token_url: String,
        client_id: String,
        client_secret: SecretSource,
        #[serde(default)]
        scopes: Vec<String>,
    },
    Token {
        token: SecretSource,
    },
}

impl SyncConfig {
    /// Checks everything that can be checked without touching secrets,
    /// the filesystem or the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = BTreeSet::new();
        let mut paths = BTreeSet::new();

        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(validation("source name must not be empty"));
            }
            if !names.insert(source.name.as_str()) {
                return Err(validation(format!("duplicate source name '{}'", source.name)));
            }
            if !paths.insert(source.path.as_path()) {
                return Err(validation(format!(
                    "source '{}' uses path '{}', which another source already uses",
                    source.name,
                    source.path.display()
                )));
            }

            source
                .target()
                .revision()
                .map_err(|e| validation(format!("source '{}': {}", source.name, e)))?;

            if let Some(credentials) = &source.credentials {
                if !self.secrets.contains_key(credentials) {
                    return Err(validation(format!(
                        "source '{}' references unknown secret '{}'",
                        source.name, credentials
                    )));
                }
            }
        }

        for (name, secret) in &self.secrets {
            match secret {
                SecretSpec::SshKey { fingerprints, .. } if fingerprints.is_empty() => {
                    return Err(validation(format!(
                        "secret '{}': ssh_key requires at least one fingerprint",
                        name
                    )));
                }
                SecretSpec::BasicAuth { password, .. } if !password.is_configured() => {
                    return Err(validation(format!(
                        "secret '{}': basic_auth requires a password",
                        name
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Looks up a source by name.
    pub fn source(&self, name: &str) -> Option<&SourceSpec> {
        self.sources.iter().find(|source| source.name == name)
    }
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}
