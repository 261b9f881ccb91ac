//! Where credential secrets come from.
//!
//! A secret-bearing field in the configuration is either written inline or
//! points at a file or an environment variable:
//!
//! ```yaml
//! password: hunter2                      # inline, for local testing
//! password: { file: /run/secrets/pw }    # Docker / Kubernetes secret mounts
//! password: { envVar: GIT_PASSWORD }     # environment injection
//! ```
//!
//! An inline value wins over a file, a file over an environment variable.
//! Values are read on every resolution and never cached here.

use std::env::{self, VarError};
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Secret has neither a value, a file nor an environment variable")]
    Unconfigured,

    #[error("Failed to read secret file '{}': {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' is not valid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// A configured secret value or a pointer to one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SecretSource {
    Inline(String),
    #[serde(rename_all = "camelCase")]
    Reference {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        env_var: Option<String>,
    },
}

impl SecretSource {
    /// Reads the secret from the first configured location.
    ///
    /// File contents and environment values are trimmed so a trailing
    /// newline never ends up inside a password.
    pub fn resolve(&self) -> Result<SecretString> {
        match self {
            SecretSource::Inline(value) if !value.is_empty() => {
                Ok(SecretString::from(value.clone()))
            }
            SecretSource::Inline(_) => Err(SecretError::Unconfigured),
            SecretSource::Reference { file, env_var } => {
                if let Some(path) = non_empty(file) {
                    read_file(&expand_home(Path::new(path)))
                } else if let Some(name) = non_empty(env_var) {
                    read_env(name)
                } else {
                    Err(SecretError::Unconfigured)
                }
            }
        }
    }

    /// Returns true if at least one location is non-empty.
    pub fn is_configured(&self) -> bool {
        match self {
            SecretSource::Inline(value) => !value.is_empty(),
            SecretSource::Reference { file, env_var } => {
                non_empty(file).is_some() || non_empty(env_var).is_some()
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn read_file(path: &Path) -> Result<SecretString> {
    fs::read_to_string(path)
        .map(|content| SecretString::from(content.trim()))
        .map_err(|source| SecretError::ReadFile {
            path: path.to_path_buf(),
            source,
        })
}

fn read_env(name: &str) -> Result<SecretString> {
    match env::var(name) {
        Ok(value) => Ok(SecretString::from(value.trim())),
        Err(VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
            name: name.to_string(),
        }),
        Err(VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
            name: name.to_string(),
        }),
    }
}

/// Expands a leading `~` to the user's home directory. `~user` is left alone.
pub(crate) fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")) {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}
