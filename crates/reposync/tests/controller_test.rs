//! Sync controller state machine tests against a recording backend.

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{fake_repository, Call, CountingProvider, Failure, MetricEvent, MockBackend, RecordingMetrics};
use reposync::credentials::CredentialResolver;
use reposync::git::CheckoutTarget;
use reposync::sync::{MarkerState, PersistedMarker, SyncController, SyncTarget};
use reposync::{SyncContext, SyncErrorKind};
use tempfile::TempDir;

const URL: &str = "https://git.example.com/acme/policies.git";
const COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";

struct Harness {
    _dir: TempDir,
    path: std::path::PathBuf,
    backend: MockBackend,
    metrics: Arc<RecordingMetrics>,
    provider: Arc<CountingProvider>,
}

impl Harness {
    fn new(backend: MockBackend) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkout");
        Self {
            _dir: dir,
            path,
            backend,
            metrics: Arc::new(RecordingMetrics::default()),
            provider: Arc::new(CountingProvider::default()),
        }
    }

    fn controller(&self, target: SyncTarget) -> SyncController {
        let resolver = CredentialResolver::new().with_provider(self.provider.clone());
        SyncController::new(
            "policies",
            target,
            Arc::new(self.backend.clone()),
            Arc::new(resolver),
        )
        .with_metrics(self.metrics.clone())
    }

    fn reference_target(&self) -> SyncTarget {
        SyncTarget::reference(&self.path, URL, "main")
    }

    fn commit_target(&self) -> SyncTarget {
        SyncTarget::commit(&self.path, URL, COMMIT)
    }

    /// An existing clone whose marker matches `target`, plus a file that
    /// disappears if the path is wiped.
    fn existing_clone(&self, target: &SyncTarget) {
        fake_repository(&self.path);
        PersistedMarker::from_target(target).write(&self.path).unwrap();
        fs::write(self.sentinel(), "keep").unwrap();
    }

    fn sentinel(&self) -> std::path::PathBuf {
        self.path.join("sentinel.txt")
    }
}

fn fetch_all_call(authenticated: bool) -> Call {
    Call::Fetch {
        refspecs: vec![
            "+refs/heads/*:refs/remotes/origin/*".to_string(),
            "+refs/tags/*:refs/tags/*".to_string(),
        ],
        force: true,
        authenticated,
    }
}

fn read_marker(path: &Path) -> PersistedMarker {
    match PersistedMarker::read(path).unwrap() {
        MarkerState::Present(marker) => marker,
        other => panic!("expected a marker, got {other:?}"),
    }
}

#[test]
fn test_missing_revision_fails_before_any_access() {
    let harness = Harness::new(MockBackend::new());
    let mut target = harness.reference_target();
    target.reference = None;

    let err = harness.controller(target).execute(&SyncContext::new()).unwrap_err();

    assert!(matches!(err.kind, SyncErrorKind::Config(_)));
    assert_eq!(err.source_name, "policies");
    assert_eq!(err.repository, URL);
    assert!(harness.backend.calls().is_empty());
    assert!(!harness.path.exists());
    assert_eq!(harness.provider.lookups(), 0);
    assert_eq!(
        harness.metrics.events(),
        vec![MetricEvent::Failure {
            source: "policies".to_string(),
            repository: URL.to_string()
        }]
    );
}

#[test]
fn test_conflicting_revision_fails_before_any_access() {
    let harness = Harness::new(MockBackend::new());
    let mut target = harness.reference_target();
    target.commit = Some(COMMIT.to_string());
    harness.existing_clone(&harness.reference_target());

    let err = harness.controller(target).execute(&SyncContext::new()).unwrap_err();

    assert!(matches!(err.kind, SyncErrorKind::Config(_)));
    assert!(harness.backend.calls().is_empty());
    assert!(harness.sentinel().exists());
}

#[test]
fn test_fresh_clone_writes_marker_with_credential_reference() {
    let harness = Harness::new(MockBackend::new());
    let target = harness.reference_target().with_credentials("deploy");

    let outcome = harness
        .controller(target.clone())
        .execute(&SyncContext::new())
        .unwrap();

    assert!(outcome.cloned);
    assert!(outcome.fetched);
    assert!(!outcome.wiped);
    assert_eq!(
        harness.backend.calls(),
        vec![
            Call::Open(harness.path.clone()),
            Call::Clone {
                path: harness.path.clone(),
                url: URL.to_string(),
                reference: Some("refs/heads/main".to_string()),
                single_branch: true,
                no_checkout: true,
                authenticated: true,
            },
            fetch_all_call(true),
            Call::Checkout {
                target: CheckoutTarget::Branch("refs/remotes/origin/main".to_string()),
                force: true,
                offline: false,
            },
        ]
    );
    // One lookup serves both the clone and the fetch
    assert_eq!(harness.provider.lookups(), 1);

    let marker = read_marker(&harness.path);
    assert_eq!(marker, PersistedMarker::from_target(&target));
    let raw = fs::read_to_string(PersistedMarker::location(&harness.path)).unwrap();
    assert!(!raw.contains("token-for-deploy"));
}

#[test]
fn test_matching_marker_is_never_wiped() {
    let harness = Harness::new(MockBackend::new());
    let target = harness.reference_target();
    harness.existing_clone(&target);

    let outcome = harness.controller(target).execute(&SyncContext::new()).unwrap();

    assert!(!outcome.wiped);
    assert!(!outcome.cloned);
    assert!(harness.sentinel().exists());
}

#[test]
fn test_credential_change_alone_does_not_wipe_or_rewrite_marker() {
    let harness = Harness::new(MockBackend::new());
    harness.existing_clone(&harness.reference_target().with_credentials("old"));

    let rotated = harness.reference_target().with_credentials("new");
    let outcome = harness.controller(rotated).execute(&SyncContext::new()).unwrap();

    assert!(!outcome.wiped);
    assert!(harness.sentinel().exists());
    assert_eq!(read_marker(&harness.path).credentials.as_deref(), Some("old"));
}

#[test]
fn test_mismatched_marker_wipes_before_open() {
    let harness = Harness::new(MockBackend::new());
    let mut previous = harness.reference_target();
    previous.url = "https://git.example.com/acme/old.git".to_string();
    harness.existing_clone(&previous);

    let target = harness.reference_target();
    let outcome = harness.controller(target.clone()).execute(&SyncContext::new()).unwrap();

    assert!(outcome.wiped);
    assert!(outcome.cloned);
    assert!(!harness.sentinel().exists());
    assert_eq!(harness.backend.calls()[0], Call::Open(harness.path.clone()));
    assert!(matches!(harness.backend.calls()[1], Call::Clone { .. }));
    assert_eq!(read_marker(&harness.path), PersistedMarker::from_target(&target));
}

#[test]
fn test_undecodable_marker_wipes() {
    let harness = Harness::new(MockBackend::new());
    harness.existing_clone(&harness.reference_target());
    fs::write(PersistedMarker::location(&harness.path), "{{{").unwrap();

    let outcome = harness
        .controller(harness.reference_target())
        .execute(&SyncContext::new())
        .unwrap();

    assert!(outcome.wiped);
    assert!(!harness.sentinel().exists());
}

#[test]
fn test_absent_marker_on_existing_repository_is_kept() {
    let harness = Harness::new(MockBackend::new());
    fake_repository(&harness.path);
    fs::write(harness.sentinel(), "keep").unwrap();

    let outcome = harness
        .controller(harness.reference_target())
        .execute(&SyncContext::new())
        .unwrap();

    assert!(!outcome.wiped);
    assert!(!outcome.cloned);
    assert!(harness.sentinel().exists());
    assert!(matches!(
        PersistedMarker::read(&harness.path).unwrap(),
        MarkerState::Absent
    ));
}

#[test]
fn test_commit_present_locally_checks_out_without_fetch() {
    let harness = Harness::new(MockBackend::new().with_local_commits(&[COMMIT]));
    let target = harness.commit_target().with_credentials("deploy");
    harness.existing_clone(&target);

    let outcome = harness.controller(target).execute(&SyncContext::new()).unwrap();

    assert!(!outcome.fetched);
    assert_eq!(
        harness.backend.calls(),
        vec![
            Call::Open(harness.path.clone()),
            Call::Checkout {
                target: CheckoutTarget::Commit(COMMIT.to_string()),
                force: true,
                offline: true,
            },
        ]
    );
    // No network, so no credentials and no success report
    assert_eq!(harness.provider.lookups(), 0);
    assert!(harness.metrics.events().is_empty());
}

#[test]
fn test_commit_absent_locally_fetches_then_checks_out() {
    let harness = Harness::new(MockBackend::new().with_remote_commits(&[COMMIT]));
    let target = harness.commit_target();
    harness.existing_clone(&target);

    let outcome = harness.controller(target).execute(&SyncContext::new()).unwrap();

    assert!(outcome.fetched);
    let commit = |offline| Call::Checkout {
        target: CheckoutTarget::Commit(COMMIT.to_string()),
        force: true,
        offline,
    };
    assert_eq!(
        harness.backend.calls(),
        vec![
            Call::Open(harness.path.clone()),
            commit(true),
            fetch_all_call(false),
            commit(false),
        ]
    );
    assert_eq!(
        harness.metrics.events(),
        vec![MetricEvent::Success {
            source: "policies".to_string(),
            repository: URL.to_string()
        }]
    );
}

#[test]
fn test_missing_private_submodule_is_fetched_with_credentials() {
    let harness = Harness::new(MockBackend::new().with_local_commits(&[COMMIT]));
    harness.backend.update(|state| state.private_submodule = true);
    let target = harness.commit_target().with_credentials("deploy");
    harness.existing_clone(&target);

    let outcome = harness.controller(target).execute(&SyncContext::new()).unwrap();

    assert!(outcome.fetched);
    let commit = |offline| Call::Checkout {
        target: CheckoutTarget::Commit(COMMIT.to_string()),
        force: true,
        offline,
    };
    assert_eq!(
        harness.backend.calls(),
        vec![
            Call::Open(harness.path.clone()),
            commit(true),
            fetch_all_call(true),
            commit(false),
        ]
    );
    assert_eq!(harness.provider.lookups(), 1);
}

#[test]
fn test_commit_pinned_fresh_clone_may_fetch_submodules() {
    let harness = Harness::new(MockBackend::new().with_remote_commits(&[COMMIT]));
    harness.backend.update(|state| state.private_submodule = true);
    let target = harness.commit_target().with_credentials("deploy");

    let outcome = harness.controller(target).execute(&SyncContext::new()).unwrap();

    assert!(outcome.cloned);
    assert_eq!(harness.backend.fetch_count(), 0);
    assert_eq!(
        harness.backend.calls().last(),
        Some(&Call::Checkout {
            target: CheckoutTarget::Commit(COMMIT.to_string()),
            force: true,
            offline: false,
        })
    );
}

#[test]
fn test_commit_missing_everywhere_fails_after_fetch() {
    let harness = Harness::new(MockBackend::new());
    let target = harness.commit_target();
    harness.existing_clone(&target);

    let err = harness.controller(target).execute(&SyncContext::new()).unwrap_err();

    assert!(matches!(err.kind, SyncErrorKind::GitBackend(_)));
    assert_eq!(harness.backend.fetch_count(), 1);
    assert!(matches!(
        harness.metrics.events().as_slice(),
        [MetricEvent::Failure { .. }]
    ));
}

#[test]
fn test_commit_pinned_fresh_clone_has_no_reference_hint() {
    let harness = Harness::new(MockBackend::new().with_remote_commits(&[COMMIT]));

    let outcome = harness
        .controller(harness.commit_target())
        .execute(&SyncContext::new())
        .unwrap();

    assert!(outcome.cloned);
    assert!(outcome.fetched);
    let calls = harness.backend.calls();
    assert!(matches!(&calls[1], Call::Clone { reference: None, .. }));
    // The clone brought the commit in, so no extra fetch
    assert_eq!(harness.backend.fetch_count(), 0);
}

#[test]
fn test_reference_always_fetches() {
    let harness = Harness::new(MockBackend::new());
    let target = harness.reference_target();
    harness.existing_clone(&target);

    let mut controller = harness.controller(target);
    for _ in 0..3 {
        let outcome = controller.execute(&SyncContext::new()).unwrap();
        assert!(outcome.fetched);
    }
    assert_eq!(harness.backend.fetch_count(), 3);
}

#[test]
fn test_tag_reference_checks_out_tag() {
    let harness = Harness::new(MockBackend::new());
    let target = SyncTarget::reference(&harness.path, URL, "refs/tags/v2.1.0");
    harness.existing_clone(&target);

    harness.controller(target).execute(&SyncContext::new()).unwrap();

    assert_eq!(
        harness.backend.calls().last(),
        Some(&Call::Checkout {
            target: CheckoutTarget::Branch("refs/tags/v2.1.0".to_string()),
            force: true,
            offline: false,
        })
    );
}

#[test]
fn test_already_up_to_date_is_success() {
    let harness = Harness::new(MockBackend::new());
    harness.backend.update(|state| state.fetch_up_to_date = true);
    let target = harness.reference_target();
    harness.existing_clone(&target);

    let outcome = harness.controller(target).execute(&SyncContext::new()).unwrap();

    assert!(outcome.fetched);
    assert!(matches!(
        harness.backend.calls().last(),
        Some(Call::Checkout { .. })
    ));
}

#[test]
fn test_fetch_failure_is_wrapped_with_context() {
    let harness = Harness::new(MockBackend::new());
    harness.backend.update(|state| state.fetch_failure = Some(Failure::Network));
    let target = harness.reference_target();
    harness.existing_clone(&target);

    let err = harness.controller(target).execute(&SyncContext::new()).unwrap_err();

    assert!(matches!(err.kind, SyncErrorKind::GitBackend(_)));
    assert!(err.to_string().starts_with(&format!("source 'policies' ({URL}): ")));
    assert!(!matches!(harness.backend.calls().last(), Some(Call::Checkout { .. })));
}

#[test]
fn test_auth_failure_is_auth_network_error() {
    let harness = Harness::new(MockBackend::new());
    harness.backend.update(|state| state.fetch_failure = Some(Failure::Auth));
    let target = harness.reference_target();
    harness.existing_clone(&target);

    let err = harness.controller(target).execute(&SyncContext::new()).unwrap_err();
    assert!(matches!(err.kind, SyncErrorKind::AuthNetwork(_)));
}

#[test]
fn test_commit_checkout_error_other_than_missing_is_fatal() {
    let harness = Harness::new(MockBackend::new().with_local_commits(&[COMMIT]));
    harness.backend.update(|state| state.checkout_failure = Some(Failure::Operation));
    let target = harness.commit_target();
    harness.existing_clone(&target);

    let err = harness.controller(target).execute(&SyncContext::new()).unwrap_err();

    assert!(matches!(err.kind, SyncErrorKind::GitBackend(_)));
    assert_eq!(harness.backend.fetch_count(), 0);
}

#[test]
fn test_open_error_other_than_not_found_is_fatal() {
    let harness = Harness::new(MockBackend::new());
    harness.backend.update(|state| state.open_failure = Some(Failure::Operation));
    let target = harness.reference_target();
    harness.existing_clone(&target);

    let err = harness.controller(target).execute(&SyncContext::new()).unwrap_err();

    assert!(matches!(err.kind, SyncErrorKind::GitBackend(_)));
    assert_eq!(harness.backend.calls().len(), 1);
    assert!(harness.sentinel().exists());
}

#[test]
fn test_failed_clone_removes_partial_checkout() {
    let harness = Harness::new(MockBackend::new());
    harness.backend.update(|state| state.clone_failure = Some(Failure::Network));

    let err = harness
        .controller(harness.reference_target())
        .execute(&SyncContext::new())
        .unwrap_err();

    assert!(matches!(err.kind, SyncErrorKind::GitBackend(_)));
    assert!(!harness.path.exists());
}

#[test]
fn test_failed_clone_into_existing_directory_keeps_directory() {
    let harness = Harness::new(MockBackend::new());
    harness.backend.update(|state| state.clone_failure = Some(Failure::Cancelled));
    fs::create_dir_all(&harness.path).unwrap();
    fs::write(harness.sentinel(), "keep").unwrap();

    let err = harness
        .controller(harness.reference_target())
        .execute(&SyncContext::new())
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(harness.sentinel().exists());
    assert!(!harness.path.join(".git").exists());
}

#[test]
fn test_cancelled_context_does_nothing() {
    let harness = Harness::new(MockBackend::new());
    let ctx = SyncContext::new();
    ctx.cancel();

    let err = harness
        .controller(harness.reference_target())
        .execute(&ctx)
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(harness.backend.calls().is_empty());
}

#[test]
fn test_unresolvable_credentials_fail_before_clone() {
    let harness = Harness::new(MockBackend::new());
    let target = harness.reference_target().with_credentials("deploy");
    let mut controller = SyncController::new(
        "policies",
        target,
        Arc::new(harness.backend.clone()),
        Arc::new(CredentialResolver::new()),
    );

    let err = controller.execute(&SyncContext::new()).unwrap_err();

    assert!(matches!(err.kind, SyncErrorKind::Credential(_)));
    assert_eq!(harness.backend.calls(), vec![Call::Open(harness.path.clone())]);
}
