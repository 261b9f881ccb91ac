//! Git backend boundary and its libgit2 implementation.

mod backend;
mod error;
mod git2_backend;
mod refs;

pub use backend::{
    CheckoutRequest, CheckoutTarget, CloneRequest, FetchRequest, GitBackend, GitWorktree,
    DEFAULT_SUBMODULE_DEPTH,
};
pub use error::{classify_message, BackendError, Result};
pub use git2_backend::{Git2Backend, Git2Worktree};
pub use refs::{fetch_all_refspecs, ReferenceName, REMOTE_NAME};
