//! The closed set of authentication strategies.

use std::fmt;

use secrecy::SecretString;

use super::bearer::BearerAuth;
use super::error::Result;
use super::github_app::GitHubAppAuth;
use super::request::{parse_header_line, OutgoingRequest};
use super::ssh::SshKeyAuth;
use crate::context::SyncContext;

/// HTTP basic credentials plus arbitrary extra headers.
#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    password: SecretString,
    headers: Vec<(String, String)>,
}

impl BasicAuth {
    /// Builds basic auth from `Name: value` header lines.
    pub fn new<I, S>(username: impl Into<String>, password: SecretString, header_lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let headers = header_lines
            .into_iter()
            .map(|line| parse_header_line(line.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            username: username.into(),
            password,
            headers,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    fn apply(&self, request: &mut OutgoingRequest) {
        request.set_basic_auth(self.username.clone(), self.password.clone());
        for (name, value) in &self.headers {
            request.set_header(name.clone(), value.clone());
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field(
                "headers",
                &self.headers.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// How requests to one remote are authenticated.
#[derive(Debug, Clone)]
pub enum AuthStrategy {
    /// HTTP basic auth with extra headers.
    Basic(BasicAuth),
    /// SSH private key with pinned host keys.
    Ssh(SshKeyAuth),
    /// Bearer token fetched from an identity provider.
    DynamicBearer(BearerAuth),
    /// Bearer token that never changes.
    StaticBearer(BearerAuth),
    /// GitHub App installation token, sent as basic auth.
    GitHubApp(GitHubAppAuth),
}

impl AuthStrategy {
    /// Diagnostic name of the strategy.
    pub fn name(&self) -> &'static str {
        match self {
            AuthStrategy::Basic(_) => "basic-auth",
            AuthStrategy::Ssh(_) => "ssh-key",
            AuthStrategy::DynamicBearer(_) => "dynamic-bearer",
            AuthStrategy::StaticBearer(_) => "static-bearer",
            AuthStrategy::GitHubApp(_) => "github-app",
        }
    }

    /// Signs an outgoing HTTP request.
    ///
    /// SSH identities are not HTTP credentials and leave the request
    /// untouched; the backend reads them through [`AuthStrategy::ssh`].
    pub fn apply(&self, ctx: &SyncContext, request: &mut OutgoingRequest) {
        match self {
            AuthStrategy::Basic(basic) => basic.apply(request),
            AuthStrategy::Ssh(_) => {}
            AuthStrategy::DynamicBearer(bearer) | AuthStrategy::StaticBearer(bearer) => {
                bearer.apply(ctx, request)
            }
            AuthStrategy::GitHubApp(app) => app.apply(ctx, request),
        }
    }

    /// Returns the SSH identity when this is an SSH strategy.
    pub fn ssh(&self) -> Option<&SshKeyAuth> {
        match self {
            AuthStrategy::Ssh(ssh) => Some(ssh),
            _ => None,
        }
    }

    /// Convenience for signing a fresh request.
    pub fn sign(&self, ctx: &SyncContext) -> OutgoingRequest {
        let mut request = OutgoingRequest::new();
        self.apply(ctx, &mut request);
        request
    }
}

impl fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
