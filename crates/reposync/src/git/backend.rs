//! The boundary between the sync controller and a git implementation.

use std::fmt;
use std::path::Path;

use super::error::Result;
use super::refs::ReferenceName;
use crate::auth::AuthStrategy;
use crate::context::SyncContext;

/// Default depth of recursive submodule updates.
pub const DEFAULT_SUBMODULE_DEPTH: u32 = 10;

/// Parameters of a fresh clone.
#[derive(Debug, Clone)]
pub struct CloneRequest<'a> {
    pub path: &'a Path,
    pub url: &'a str,
    pub auth: Option<&'a AuthStrategy>,
    /// Reference to clone; also limits the clone when `single_branch` is set.
    pub reference: Option<&'a ReferenceName>,
    pub single_branch: bool,
    /// Leave the working tree empty; the caller checks out afterwards.
    pub no_checkout: bool,
}

/// Parameters of a fetch from the origin remote.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub auth: Option<&'a AuthStrategy>,
    pub refspecs: &'a [String],
    pub force: bool,
}

/// What to check out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutTarget {
    /// A local ref, such as a remote-tracking branch or a tag.
    Branch(String),
    /// A commit hash, full or abbreviated.
    Commit(String),
}

/// Parameters of a checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub target: &'a CheckoutTarget,
    /// Overwrite local modifications.
    pub force: bool,
    /// Never contact a remote. Submodule commits that are not present
    /// locally then fail the checkout with `ObjectNotFound` instead of
    /// being fetched.
    pub offline: bool,
}

impl fmt::Display for CheckoutTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckoutTarget::Branch(name) => write!(f, "ref {}", name),
            CheckoutTarget::Commit(hash) => write!(f, "commit {}", hash),
        }
    }
}

/// Opens and clones repositories.
///
/// The backend owns repository-wide settings such as the submodule
/// recursion depth, so opened and cloned repositories behave alike.
pub trait GitBackend: Send + Sync {
    /// Opens the repository at `path`.
    ///
    /// Must fail with [`BackendError::RepositoryNotFound`](super::BackendError::RepositoryNotFound)
    /// when there is no repository there.
    fn open(&self, path: &Path) -> Result<Box<dyn GitWorktree>>;

    /// Clones into `request.path`, returning a handle to the new repository.
    fn clone_repository(
        &self,
        ctx: &SyncContext,
        request: &CloneRequest<'_>,
    ) -> Result<Box<dyn GitWorktree>>;
}

/// An opened repository together with its working tree.
pub trait GitWorktree {
    /// Fetches from the origin remote.
    ///
    /// May return [`BackendError::AlreadyUpToDate`](super::BackendError::AlreadyUpToDate)
    /// when nothing changed.
    fn fetch(&mut self, ctx: &SyncContext, request: &FetchRequest<'_>) -> Result<()>;

    /// Checks out the target with a detached HEAD, then updates submodules.
    ///
    /// Must fail with [`BackendError::ObjectNotFound`](super::BackendError::ObjectNotFound)
    /// when the target is not present locally, or when an offline checkout
    /// needs a submodule commit that is not present locally.
    fn checkout(&mut self, ctx: &SyncContext, request: &CheckoutRequest<'_>) -> Result<()>;
}
