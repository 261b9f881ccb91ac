//! The record of the configuration a local clone was created from.
//!
//! The marker lives inside the repository's `.git` directory so a checkout
//! never touches it. It holds only structural identity: the URL, revision
//! and the *name* of the credential, never secret values.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::target::SyncTarget;
use crate::error::PersistenceError;

/// File name of the marker inside the git directory.
pub const MARKER_FILE: &str = "reposync-marker.json";

/// Snapshot of the non-secret fields of the target that created a clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedMarker {
    pub url: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub credentials: Option<String>,
}

/// Outcome of reading the marker.
#[derive(Debug)]
pub enum MarkerState {
    /// No marker; the path has not been cloned by a sync run.
    Absent,
    /// A marker exists but cannot be decoded.
    Undecodable(String),
    Present(PersistedMarker),
}

impl PersistedMarker {
    pub fn from_target(target: &SyncTarget) -> Self {
        Self {
            url: target.url.clone(),
            reference: target.reference.clone(),
            commit: target.commit.clone(),
            credentials: target.credentials.clone(),
        }
    }

    /// Location of the marker for a repository at `repo_path`.
    pub fn location(repo_path: &Path) -> PathBuf {
        repo_path.join(".git").join(MARKER_FILE)
    }

    /// Reads the marker of the repository at `repo_path`.
    pub fn read(repo_path: &Path) -> Result<MarkerState, PersistenceError> {
        let path = Self::location(repo_path);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(MarkerState::Absent),
            Err(source) => return Err(PersistenceError::ReadMarker { path, source }),
        };
        match serde_json::from_slice(&content) {
            Ok(marker) => Ok(MarkerState::Present(marker)),
            Err(e) => Ok(MarkerState::Undecodable(e.to_string())),
        }
    }

    /// Writes the marker, replacing any previous one.
    pub fn write(&self, repo_path: &Path) -> Result<(), PersistenceError> {
        let path = Self::location(repo_path);
        let encoded = serde_json::to_vec_pretty(self)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, encoded).map_err(|source| PersistenceError::WriteMarker {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| PersistenceError::WriteMarker {
            path: path.clone(),
            source,
        })
    }

    /// Rebuilds the target this marker describes, taking the path and the
    /// credential reference from `current`.
    pub fn as_target(&self, current: &SyncTarget) -> SyncTarget {
        SyncTarget {
            path: current.path.clone(),
            url: self.url.clone(),
            reference: self.reference.clone(),
            commit: self.commit.clone(),
            credentials: current.credentials.clone(),
        }
    }

    /// Returns true if the marker describes `current`, ignoring credentials.
    pub fn matches(&self, current: &SyncTarget) -> bool {
        self.as_target(current) == *current
    }
}
