//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reposync::context::SyncContext;
use reposync::credentials::SecretProvider;
use reposync::git::{
    BackendError, CheckoutRequest, CheckoutTarget, CloneRequest, FetchRequest, GitBackend,
    GitWorktree, Result,
};
use reposync::metrics::SyncMetrics;
use serde_json::{json, Map, Value};

/// One call made against the mock backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(PathBuf),
    Clone {
        path: PathBuf,
        url: String,
        reference: Option<String>,
        single_branch: bool,
        no_checkout: bool,
        authenticated: bool,
    },
    Fetch {
        refspecs: Vec<String>,
        force: bool,
        authenticated: bool,
    },
    Checkout {
        target: CheckoutTarget,
        force: bool,
        offline: bool,
    },
}

/// Canned failure the mock returns instead of succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Network,
    Auth,
    Cancelled,
    Operation,
}

impl Failure {
    fn error(self) -> BackendError {
        match self {
            Failure::Network => BackendError::Network("connection refused".to_string()),
            Failure::Auth => BackendError::Authentication("401".to_string()),
            Failure::Cancelled => BackendError::Cancelled,
            Failure::Operation => BackendError::Operation("boom".to_string()),
        }
    }
}

/// Mutable state behind [`MockBackend`].
///
/// A repository "exists" when `<path>/.git` is a directory, so wipes made
/// by the controller are observed through the real filesystem.
#[derive(Debug, Default)]
pub struct MockState {
    pub calls: Vec<Call>,
    /// Commits present in the local repository.
    pub local_commits: HashSet<String>,
    /// Commits a clone or fetch brings in.
    pub remote_commits: HashSet<String>,
    pub fetch_up_to_date: bool,
    /// The checked-out commit has a submodule that is not present locally
    /// and can only be fetched with credentials.
    pub private_submodule: bool,
    pub open_failure: Option<Failure>,
    pub clone_failure: Option<Failure>,
    pub fetch_failure: Option<Failure>,
    pub checkout_failure: Option<Failure>,
}

/// In-memory git backend that records every call.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    pub state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote_commits(self, commits: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .remote_commits
            .extend(commits.iter().map(|c| c.to_string()));
        self
    }

    pub fn with_local_commits(self, commits: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .local_commits
            .extend(commits.iter().map(|c| c.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Fetch { .. }))
            .count()
    }
}

impl GitBackend for MockBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn GitWorktree>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Open(path.to_path_buf()));
        if let Some(failure) = state.open_failure {
            return Err(failure.error());
        }
        if path.join(".git").is_dir() {
            Ok(Box::new(MockWorktree {
                state: Arc::clone(&self.state),
                authenticated: false,
            }))
        } else {
            Err(BackendError::RepositoryNotFound(path.to_path_buf()))
        }
    }

    fn clone_repository(
        &self,
        _ctx: &SyncContext,
        request: &CloneRequest<'_>,
    ) -> Result<Box<dyn GitWorktree>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Clone {
            path: request.path.to_path_buf(),
            url: request.url.to_string(),
            reference: request.reference.map(|r| r.full_name()),
            single_branch: request.single_branch,
            no_checkout: request.no_checkout,
            authenticated: request.auth.is_some(),
        });

        // A clone creates its git directory before it can fail
        fs::create_dir_all(request.path.join(".git")).unwrap();
        if let Some(failure) = state.clone_failure {
            return Err(failure.error());
        }

        let remote: Vec<String> = state.remote_commits.iter().cloned().collect();
        state.local_commits.extend(remote);
        Ok(Box::new(MockWorktree {
            state: Arc::clone(&self.state),
            authenticated: request.auth.is_some(),
        }))
    }
}

struct MockWorktree {
    state: Arc<Mutex<MockState>>,
    /// Whether the last clone or fetch carried credentials.
    authenticated: bool,
}

impl GitWorktree for MockWorktree {
    fn fetch(&mut self, _ctx: &SyncContext, request: &FetchRequest<'_>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Fetch {
            refspecs: request.refspecs.to_vec(),
            force: request.force,
            authenticated: request.auth.is_some(),
        });
        if let Some(failure) = state.fetch_failure {
            return Err(failure.error());
        }
        let remote: Vec<String> = state.remote_commits.iter().cloned().collect();
        state.local_commits.extend(remote);
        if state.fetch_up_to_date {
            return Err(BackendError::AlreadyUpToDate);
        }
        self.authenticated = request.auth.is_some();
        Ok(())
    }

    fn checkout(&mut self, _ctx: &SyncContext, request: &CheckoutRequest<'_>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Checkout {
            target: request.target.clone(),
            force: request.force,
            offline: request.offline,
        });
        if let Some(failure) = state.checkout_failure {
            return Err(failure.error());
        }
        if let CheckoutTarget::Commit(hash) = request.target {
            if !state.local_commits.contains(hash) {
                return Err(BackendError::ObjectNotFound(hash.clone()));
            }
        }
        if state.private_submodule {
            if request.offline {
                return Err(BackendError::ObjectNotFound("submodule vendor".to_string()));
            }
            if !self.authenticated {
                return Err(BackendError::Authentication(
                    "submodule vendor requires credentials".to_string(),
                ));
            }
            state.private_submodule = false;
        }
        Ok(())
    }
}

/// A metrics report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricEvent {
    Success { source: String, repository: String },
    Failure { source: String, repository: String },
}

#[derive(Debug, Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingMetrics {
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl SyncMetrics for RecordingMetrics {
    fn record_failure(&self, source: &str, repository: &str) {
        self.events.lock().unwrap().push(MetricEvent::Failure {
            source: source.to_string(),
            repository: repository.to_string(),
        });
    }

    fn record_success(&self, source: &str, repository: &str, _duration: Duration) {
        self.events.lock().unwrap().push(MetricEvent::Success {
            source: source.to_string(),
            repository: repository.to_string(),
        });
    }
}

/// Secret provider serving static bearer tokens and counting lookups.
#[derive(Debug, Default)]
pub struct CountingProvider {
    lookups: AtomicUsize,
}

impl CountingProvider {
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl SecretProvider for CountingProvider {
    fn get_secret(
        &self,
        _ctx: &SyncContext,
        name: &str,
    ) -> std::result::Result<Map<String, Value>, Box<dyn std::error::Error + Send + Sync>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match json!({"type": "token", "token": format!("token-for-{name}")}) {
            Value::Object(map) => Ok(map),
            _ => Err("unreachable".into()),
        }
    }
}

/// Creates `<path>/.git` so the mock backend treats the path as a repository.
pub fn fake_repository(path: &Path) {
    fs::create_dir_all(path.join(".git")).unwrap();
}
