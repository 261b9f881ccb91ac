//! What a sync run aligns the local path with.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::git::ReferenceName;

const MIN_COMMIT_LEN: usize = 4;
const MAX_COMMIT_LEN: usize = 64;

/// One local working copy and the remote revision it should match.
///
/// Exactly one of `reference` and `commit` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTarget {
    pub path: PathBuf,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Name of the credential to authenticate with; `None` is anonymous.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

/// The validated revision a target points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    Reference(ReferenceName),
    /// Lowercase hex, full or abbreviated.
    Commit(String),
}

impl SyncTarget {
    /// Creates a target following a branch or tag.
    pub fn reference(
        path: impl Into<PathBuf>,
        url: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
            reference: Some(reference.into()),
            commit: None,
            credentials: None,
        }
    }

    /// Creates a target pinned to a commit.
    pub fn commit(path: impl Into<PathBuf>, url: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
            reference: None,
            commit: Some(commit.into()),
            credentials: None,
        }
    }

    /// Sets the credential reference.
    pub fn with_credentials(mut self, name: impl Into<String>) -> Self {
        self.credentials = Some(name.into());
        self
    }

    /// Checks the target and returns the revision it points at.
    ///
    /// Touches neither the filesystem nor the network.
    pub fn revision(&self) -> Result<Revision, ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::EmptyField("url"));
        }
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyField("path"));
        }

        let reference = self.reference.as_deref().filter(|r| !r.is_empty());
        let commit = self.commit.as_deref().filter(|c| !c.is_empty());

        match (reference, commit) {
            (None, None) => Err(ConfigError::MissingRevision),
            (Some(reference), Some(commit)) => Err(ConfigError::ConflictingRevision {
                reference: reference.to_string(),
                commit: commit.to_string(),
            }),
            (Some(reference), None) => ReferenceName::parse(reference).map(Revision::Reference),
            (None, Some(commit)) => parse_commit(commit).map(Revision::Commit),
        }
    }
}

fn parse_commit(raw: &str) -> Result<String, ConfigError> {
    let valid = (MIN_COMMIT_LEN..=MAX_COMMIT_LEN).contains(&raw.len())
        && raw.chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(raw.to_ascii_lowercase())
    } else {
        Err(ConfigError::InvalidCommit(raw.to_string()))
    }
}
