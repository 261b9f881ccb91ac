//! Cancellation context threaded through every network call of a sync run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

/// Phase of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Discarding a local path whose marker no longer matches.
    Wiping,
    /// Resolving credentials for the configured reference.
    ResolvingCredentials,
    /// Cloning into an empty local path.
    Cloning,
    /// Fetching heads and tags from the remote.
    Fetching,
    /// Checking out the target revision.
    CheckingOut,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Wiping => write!(f, "wiping"),
            SyncPhase::ResolvingCredentials => write!(f, "resolving credentials"),
            SyncPhase::Cloning => write!(f, "cloning"),
            SyncPhase::Fetching => write!(f, "fetching"),
            SyncPhase::CheckingOut => write!(f, "checking out"),
        }
    }
}

/// Caller-supplied context for one or more sync runs.
///
/// Clones share the same cancellation flag, so a context handed to a
/// signal handler can abort a clone or fetch that is in flight on another
/// thread. Cancellation is sticky: once cancelled, every later network call
/// made with this context fails fast.
#[derive(Debug, Clone)]
pub struct SyncContext {
    operation_id: String,
    cancelled: Arc<AtomicBool>,
}

impl SyncContext {
    /// Creates a fresh, uncancelled context.
    pub fn new() -> Self {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Gets the operation ID used to correlate log lines.
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Marks this context (and all of its clones) as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true if the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns a clone of the cancellation flag for sharing with signal handlers.
    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Logs entry into a phase of the current run.
    pub fn phase(&self, phase: SyncPhase) {
        tracing::debug!(operation_id = %self.operation_id, "{}", phase);
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new()
    }
}
