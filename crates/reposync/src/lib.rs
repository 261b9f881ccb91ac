pub mod auth;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod git;
pub mod logging;
pub mod metrics;
pub mod secrets;
pub mod sync;

pub use auth::{AuthError, AuthStrategy, GitHubAppTokenCache, OutgoingRequest, TokenSource};
pub use config::{load_config, SecretSpec, SourceSpec, SyncConfig};
pub use context::{SyncContext, SyncPhase};
pub use credentials::{
    ConfigSecretStore, CredentialError, CredentialResolver, CredentialSpec, SecretProvider,
    TypedSecretResolver,
};
pub use error::{ConfigError, PersistenceError, Result, SyncError, SyncErrorKind};
pub use git::{BackendError, Git2Backend, GitBackend, GitWorktree};
pub use metrics::{LogMetrics, NoopMetrics, SyncMetrics};
pub use secrets::{SecretError, SecretSource};
pub use sync::{PersistedMarker, Revision, SyncController, SyncOutcome, SyncTarget};
