//! Request-signing strategies for git remotes.

mod bearer;
mod error;
mod github_app;
mod oidc;
mod request;
mod ssh;
mod strategy;

pub use bearer::{BearerAuth, StaticToken, TokenSource};
pub use error::{AuthError, Result};
pub use github_app::{
    GitHubAppAuth, GitHubAppTokenCache, InstallationTokenTransport, DEFAULT_API_BASE,
    INSTALLATION_TOKEN_USER,
};
pub use oidc::ClientCredentialsSource;
pub use request::{parse_header_line, BasicCredentials, OutgoingRequest};
pub use ssh::{fingerprint_sha256, format_fingerprint, FingerprintAllowlist, SshKeyAuth};
pub use strategy::{AuthStrategy, BasicAuth};
