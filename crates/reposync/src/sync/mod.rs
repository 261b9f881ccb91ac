//! Aligning a local working copy with a remote reference or commit.
//!
//! Each run of [`SyncController::execute`] goes through the same steps:
//!
//! 1. Validate the target (exactly one of reference and commit).
//! 2. Compare the persisted marker with the target, ignoring credentials;
//!    on mismatch or an unreadable marker, delete the local path.
//! 3. Open the local repository, or clone it and write a fresh marker.
//! 4. For a pinned commit, try a local checkout first and stop if it works.
//! 5. Force-fetch all branches and tags.
//! 6. Force-checkout the remote-tracking branch, tag or commit.

mod controller;
mod marker;
mod target;

pub use controller::{SyncController, SyncOutcome};
pub use marker::{MarkerState, PersistedMarker, MARKER_FILE};
pub use target::{Revision, SyncTarget};
