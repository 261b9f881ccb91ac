//! Reference names and refspecs.

use std::fmt;

use crate::error::ConfigError;

/// Name of the remote every synchronized repository fetches from.
pub const REMOTE_NAME: &str = "origin";

const HEADS_PREFIX: &str = "refs/heads/";
const TAGS_PREFIX: &str = "refs/tags/";

/// Refspecs for the forced fetch of all branches and tags.
pub fn fetch_all_refspecs() -> Vec<String> {
    vec![
        format!("+{HEADS_PREFIX}*:refs/remotes/{REMOTE_NAME}/*"),
        format!("+{TAGS_PREFIX}*:{TAGS_PREFIX}*"),
    ]
}

/// A configured branch or tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceName {
    Branch(String),
    Tag(String),
}

impl ReferenceName {
    /// Parses `refs/heads/<b>`, `refs/tags/<t>`, or a bare branch name.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidReference {
            reference: raw.to_string(),
            reason: reason.to_string(),
        };

        let reference = if let Some(branch) = raw.strip_prefix(HEADS_PREFIX) {
            ReferenceName::Branch(branch.to_string())
        } else if let Some(tag) = raw.strip_prefix(TAGS_PREFIX) {
            ReferenceName::Tag(tag.to_string())
        } else if raw.starts_with("refs/") {
            return Err(invalid("only refs/heads/ and refs/tags/ are supported"));
        } else {
            ReferenceName::Branch(raw.to_string())
        };

        if reference.short_name().is_empty() {
            return Err(invalid("name is empty"));
        }
        if !git2::Reference::is_valid_name(&reference.full_name()) {
            return Err(invalid("not a valid git reference name"));
        }
        Ok(reference)
    }

    /// Branch or tag name without its namespace.
    pub fn short_name(&self) -> &str {
        match self {
            ReferenceName::Branch(name) | ReferenceName::Tag(name) => name,
        }
    }

    /// Full name on the remote.
    pub fn full_name(&self) -> String {
        match self {
            ReferenceName::Branch(name) => format!("{HEADS_PREFIX}{name}"),
            ReferenceName::Tag(name) => format!("{TAGS_PREFIX}{name}"),
        }
    }

    /// Local ref checked out for this reference after a fetch.
    pub fn checkout_ref(&self) -> String {
        match self {
            ReferenceName::Branch(name) => format!("refs/remotes/{REMOTE_NAME}/{name}"),
            ReferenceName::Tag(name) => format!("{TAGS_PREFIX}{name}"),
        }
    }

    /// Refspec fetching only this reference (used for single-branch clones).
    pub fn single_refspec(&self) -> String {
        format!("+{}:{}", self.full_name(), self.checkout_ref())
    }
}

impl fmt::Display for ReferenceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
