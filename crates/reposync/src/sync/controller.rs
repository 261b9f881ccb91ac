//! The per-repository sync state machine.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, info_span, warn};

use super::marker::{MarkerState, PersistedMarker};
use super::target::{Revision, SyncTarget};
use crate::auth::AuthStrategy;
use crate::context::{SyncContext, SyncPhase};
use crate::credentials::CredentialResolver;
use crate::error::{PersistenceError, SyncError, SyncErrorKind};
use crate::git::{
    fetch_all_refspecs, BackendError, CheckoutRequest, CheckoutTarget, CloneRequest,
    FetchRequest, GitBackend, GitWorktree,
};
use crate::metrics::{NoopMetrics, SyncMetrics};

/// What a successful run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// The local path was deleted because its marker did not match.
    pub wiped: bool,
    /// A fresh clone was made.
    pub cloned: bool,
    /// The remote was contacted (clone or fetch).
    pub fetched: bool,
}

/// Credentials resolved at most once per run, and only when the remote is
/// actually contacted.
#[derive(Default)]
struct LazyCredentials {
    resolved: Option<Option<AuthStrategy>>,
}

impl LazyCredentials {
    fn get(
        &mut self,
        ctx: &SyncContext,
        resolver: &CredentialResolver,
        name: Option<&str>,
    ) -> Result<Option<&AuthStrategy>, SyncErrorKind> {
        if self.resolved.is_none() {
            ctx.phase(SyncPhase::ResolvingCredentials);
            let strategy = resolver.resolve(ctx, name)?;
            if let Some(strategy) = &strategy {
                debug!(strategy = strategy.name(), "Using credentials");
            }
            self.resolved = Some(strategy);
        }
        Ok(self.resolved.as_ref().and_then(Option::as_ref))
    }
}

/// Keeps one local path aligned with one [`SyncTarget`].
///
/// A controller drives a single path and is not meant to be shared; run
/// one controller per repository to sync several in parallel.
pub struct SyncController {
    name: String,
    target: SyncTarget,
    backend: Arc<dyn GitBackend>,
    resolver: Arc<CredentialResolver>,
    metrics: Arc<dyn SyncMetrics>,
}

impl SyncController {
    pub fn new(
        name: impl Into<String>,
        target: SyncTarget,
        backend: Arc<dyn GitBackend>,
        resolver: Arc<CredentialResolver>,
    ) -> Self {
        Self {
            name: name.into(),
            target,
            backend,
            resolver,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn SyncMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    /// Runs one sync.
    ///
    /// Failures are reported to the metrics sink; successes only when the
    /// remote was contacted.
    pub fn execute(&mut self, ctx: &SyncContext) -> Result<SyncOutcome, SyncError> {
        let _span = info_span!(
            "sync",
            source = %self.name,
            repository = %self.target.url,
            operation_id = %ctx.operation_id()
        )
        .entered();
        let started = Instant::now();

        match self.run(ctx) {
            Ok(outcome) => {
                if outcome.fetched {
                    self.metrics
                        .record_success(&self.name, &self.target.url, started.elapsed());
                }
                debug!(?outcome, "Sync finished");
                Ok(outcome)
            }
            Err(kind) => {
                self.metrics.record_failure(&self.name, &self.target.url);
                Err(SyncError::new(&self.name, &self.target.url, kind))
            }
        }
    }

    fn run(&self, ctx: &SyncContext) -> Result<SyncOutcome, SyncErrorKind> {
        let revision = self.target.revision()?;
        if ctx.is_cancelled() {
            return Err(SyncErrorKind::Cancelled);
        }

        let path = self.target.path.as_path();
        let mut outcome = SyncOutcome::default();
        let mut credentials = LazyCredentials::default();

        outcome.wiped = self.discard_if_stale(ctx, path)?;

        let mut worktree = match self.backend.open(path) {
            Ok(worktree) => worktree,
            Err(BackendError::RepositoryNotFound(_)) => {
                let auth = credentials.get(ctx, &self.resolver, self.target.credentials.as_deref())?;
                let worktree = self.clone_fresh(ctx, path, &revision, auth)?;
                outcome.cloned = true;
                outcome.fetched = true;
                worktree
            }
            Err(e) => return Err(e.into()),
        };

        if let Revision::Commit(hash) = &revision {
            ctx.phase(SyncPhase::CheckingOut);
            let pinned = CheckoutTarget::Commit(hash.clone());
            // A fresh clone may still fetch submodules
            let request = CheckoutRequest {
                target: &pinned,
                force: true,
                offline: !outcome.cloned,
            };
            match worktree.checkout(ctx, &request) {
                Ok(()) => {
                    info!(commit = %hash, "Checked out pinned commit without fetching");
                    return Ok(outcome);
                }
                Err(BackendError::ObjectNotFound(_)) => {
                    debug!(commit = %hash, "Pinned commit or its submodules not present locally, fetching");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let auth = credentials.get(ctx, &self.resolver, self.target.credentials.as_deref())?;
        self.fetch(ctx, worktree.as_mut(), auth)?;
        outcome.fetched = true;

        let target = match &revision {
            Revision::Reference(reference) => CheckoutTarget::Branch(reference.checkout_ref()),
            Revision::Commit(hash) => CheckoutTarget::Commit(hash.clone()),
        };
        ctx.phase(SyncPhase::CheckingOut);
        worktree.checkout(
            ctx,
            &CheckoutRequest {
                target: &target,
                force: true,
                offline: false,
            },
        )?;
        info!(%target, "Checked out");

        Ok(outcome)
    }

    /// Deletes the local path when its marker is unreadable or describes a
    /// different target. Returns true if the path was deleted.
    fn discard_if_stale(&self, ctx: &SyncContext, path: &Path) -> Result<bool, SyncErrorKind> {
        let reason = match PersistedMarker::read(path)? {
            MarkerState::Absent => {
                debug!("No sync marker found");
                return Ok(false);
            }
            MarkerState::Present(marker) if marker.matches(&self.target) => return Ok(false),
            MarkerState::Present(_) => "configuration changed".to_string(),
            MarkerState::Undecodable(e) => format!("marker unreadable: {}", e),
        };

        ctx.phase(SyncPhase::Wiping);
        info!(path = %path.display(), %reason, "Discarding local clone");
        remove_path(path)?;
        Ok(true)
    }

    fn clone_fresh(
        &self,
        ctx: &SyncContext,
        path: &Path,
        revision: &Revision,
        auth: Option<&AuthStrategy>,
    ) -> Result<Box<dyn GitWorktree>, SyncErrorKind> {
        ctx.phase(SyncPhase::Cloning);
        info!(path = %path.display(), "Cloning");

        let existed = path.exists();
        let reference = match revision {
            Revision::Reference(reference) => Some(reference),
            Revision::Commit(_) => None,
        };
        let request = CloneRequest {
            path,
            url: &self.target.url,
            auth,
            reference,
            single_branch: true,
            no_checkout: true,
        };

        let worktree = match self.backend.clone_repository(ctx, &request) {
            Ok(worktree) => worktree,
            Err(e) => {
                discard_partial_clone(path, existed);
                return Err(e.into());
            }
        };

        PersistedMarker::from_target(&self.target).write(path)?;
        Ok(worktree)
    }

    fn fetch(
        &self,
        ctx: &SyncContext,
        worktree: &mut dyn GitWorktree,
        auth: Option<&AuthStrategy>,
    ) -> Result<(), SyncErrorKind> {
        ctx.phase(SyncPhase::Fetching);
        let refspecs = fetch_all_refspecs();
        let request = FetchRequest {
            auth,
            refspecs: &refspecs,
            force: true,
        };
        match worktree.fetch(ctx, &request) {
            Ok(()) => info!("Fetched"),
            Err(BackendError::AlreadyUpToDate) => debug!("Already up to date"),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

fn remove_path(path: &Path) -> Result<(), PersistenceError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PersistenceError::Wipe {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Removes what a failed clone left behind so the next run clones again.
///
/// A directory that existed before the clone is kept; only its `.git` is
/// removed.
fn discard_partial_clone(path: &Path, existed: bool) {
    let leftover = if existed {
        path.join(".git")
    } else {
        path.to_path_buf()
    };
    if let Err(e) = remove_path(&leftover) {
        warn!(path = %leftover.display(), "Failed to remove partial clone: {}", e);
    }
}
