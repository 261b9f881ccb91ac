//! Normalized credential description.
//!
//! Both resolution paths (generic attribute maps and typed secrets) produce
//! a [`CredentialSpec`]; field validation for each credential type lives
//! here and nowhere else.

use std::fmt;
use std::path::PathBuf;

use secrecy::SecretString;
use serde_json::{Map, Value};

use super::error::{CredentialError, Result};

/// Attribute naming the credential type in a generic secret map.
pub const TYPE_ATTRIBUTE: &str = "type";

/// One credential, with secret values already materialized.
#[derive(Clone)]
pub enum CredentialSpec {
    BasicAuth {
        username: String,
        password: SecretString,
        headers: Vec<String>,
    },
    GitHubApp {
        integration_id: u64,
        installation_id: u64,
        private_key_path: PathBuf,
    },
    SshKey {
        key: SecretString,
        passphrase: Option<SecretString>,
        fingerprints: Vec<String>,
    },
    OidcClientCredentials {
        token_url: String,
        client_id: String,
        client_secret: SecretString,
        scopes: Vec<String>,
    },
    Token {
        token: SecretString,
    },
}

impl CredentialSpec {
    /// Type discriminator, as written in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            CredentialSpec::BasicAuth { .. } => "basic_auth",
            CredentialSpec::GitHubApp { .. } => "github_app",
            CredentialSpec::SshKey { .. } => "ssh_key",
            CredentialSpec::OidcClientCredentials { .. } => "oidc_client_credentials",
            CredentialSpec::Token { .. } => "token",
        }
    }

    /// Parses a generic attribute map returned by a secret provider.
    ///
    /// The map must carry a `type` attribute; the remaining attributes
    /// depend on it:
    ///
    /// | type | required | optional |
    /// |---|---|---|
    /// | `basic_auth` | `password` | `user`, `headers` |
    /// | `github_app` | `integration_id`, `installation_id`, `private_key` | |
    /// | `ssh_key` | `key`, `fingerprints` | `passphrase` |
    /// | `oidc_client_credentials` | `token_url`, `client_id`, `client_secret` | `scopes` |
    /// | `token` | `token` | |
    pub fn from_attributes(name: &str, attributes: &Map<String, Value>) -> Result<Self> {
        let kind = match attributes.get(TYPE_ATTRIBUTE) {
            Some(Value::String(kind)) if !kind.is_empty() => kind.as_str(),
            Some(Value::String(_)) | None => {
                return Err(CredentialError::MissingType(name.to_string()))
            }
            Some(_) => return Err(CredentialError::invalid(name, "type", "expected a string")),
        };
        let fields = Attributes { name, attributes };

        match kind {
            "basic_auth" => Ok(CredentialSpec::BasicAuth {
                username: fields.string("user")?.unwrap_or_default(),
                password: fields.required_secret("password")?,
                headers: fields.string_list("headers")?,
            }),
            "github_app" => Ok(CredentialSpec::GitHubApp {
                integration_id: fields.required_id("integration_id")?,
                installation_id: fields.required_id("installation_id")?,
                private_key_path: PathBuf::from(fields.required_string("private_key")?),
            }),
            "ssh_key" => {
                let key = fields.required_secret("key")?;
                let fingerprints = fields.string_list("fingerprints")?;
                if fingerprints.is_empty() {
                    return Err(if attributes.contains_key("fingerprints") {
                        CredentialError::invalid(name, "fingerprints", "must not be empty")
                    } else {
                        CredentialError::missing(name, "fingerprints")
                    });
                }
                Ok(CredentialSpec::SshKey {
                    key,
                    passphrase: fields.string("passphrase")?.map(SecretString::from),
                    fingerprints,
                })
            }
            "oidc_client_credentials" => Ok(CredentialSpec::OidcClientCredentials {
                token_url: fields.required_string("token_url")?,
                client_id: fields.required_string("client_id")?,
                client_secret: fields.required_secret("client_secret")?,
                scopes: fields.string_list("scopes")?,
            }),
            "token" => Ok(CredentialSpec::Token {
                token: fields.required_secret("token")?,
            }),
            other => Err(CredentialError::UnsupportedType {
                name: name.to_string(),
                kind: other.to_string(),
            }),
        }
    }
}

impl fmt::Debug for CredentialSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSpec::BasicAuth { username, headers, .. } => f
                .debug_struct("BasicAuth")
                .field("username", username)
                .field("headers", &headers.len())
                .finish_non_exhaustive(),
            CredentialSpec::GitHubApp {
                integration_id,
                installation_id,
                private_key_path,
            } => f
                .debug_struct("GitHubApp")
                .field("integration_id", integration_id)
                .field("installation_id", installation_id)
                .field("private_key_path", private_key_path)
                .finish(),
            CredentialSpec::SshKey { fingerprints, .. } => f
                .debug_struct("SshKey")
                .field("fingerprints", fingerprints)
                .finish_non_exhaustive(),
            CredentialSpec::OidcClientCredentials {
                token_url,
                client_id,
                scopes,
                ..
            } => f
                .debug_struct("OidcClientCredentials")
                .field("token_url", token_url)
                .field("client_id", client_id)
                .field("scopes", scopes)
                .finish_non_exhaustive(),
            CredentialSpec::Token { .. } => f.debug_struct("Token").finish_non_exhaustive(),
        }
    }
}

/// Typed accessors over a credential attribute map.
struct Attributes<'a> {
    name: &'a str,
    attributes: &'a Map<String, Value>,
}

impl Attributes<'_> {
    fn string(&self, field: &'static str) -> Result<Option<String>> {
        match self.attributes.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(CredentialError::invalid(self.name, field, "expected a string")),
        }
    }

    fn required_string(&self, field: &'static str) -> Result<String> {
        self.string(field)?
            .ok_or_else(|| CredentialError::missing(self.name, field))
    }

    fn required_secret(&self, field: &'static str) -> Result<SecretString> {
        self.required_string(field).map(SecretString::from)
    }

    /// Accepts integers and integral floats (JSON decoders often produce
    /// the latter for plain numbers).
    fn required_id(&self, field: &'static str) -> Result<u64> {
        let value = self
            .attributes
            .get(field)
            .ok_or_else(|| CredentialError::missing(self.name, field))?;
        if let Some(id) = value.as_u64() {
            return Ok(id);
        }
        match value.as_f64() {
            Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
            Some(_) => Err(CredentialError::invalid(
                self.name,
                field,
                "expected a non-negative integer",
            )),
            None => Err(CredentialError::invalid(self.name, field, "expected a number")),
        }
    }

    /// A list of strings; a single string counts as a one-element list.
    fn string_list(&self, field: &'static str) -> Result<Vec<String>> {
        match self.attributes.get(field) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(vec![s.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        CredentialError::invalid(self.name, field, "expected a list of strings")
                    })
                })
                .collect(),
            Some(_) => Err(CredentialError::invalid(
                self.name,
                field,
                "expected a list of strings",
            )),
        }
    }
}
