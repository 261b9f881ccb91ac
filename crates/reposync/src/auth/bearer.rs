//! Bearer token authentication.

use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use super::error::Result;
use super::request::OutgoingRequest;
use crate::context::SyncContext;

/// Supplies a bearer token on demand.
///
/// Implementations may hit the network; they receive the sync context so a
/// cancelled run does not start new token requests.
pub trait TokenSource: Send + Sync {
    /// Returns the current token.
    fn token(&self, ctx: &SyncContext) -> Result<SecretString>;
}

/// A token that never changes.
pub struct StaticToken {
    token: SecretString,
}

impl StaticToken {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

impl TokenSource for StaticToken {
    fn token(&self, _ctx: &SyncContext) -> Result<SecretString> {
        Ok(self.token.clone())
    }
}

/// Signs requests with `Authorization: Bearer <token>`.
///
/// The token source is asked for a token on every signed request. If that
/// fails the header is left out and the request goes ahead unsigned; the
/// remote then rejects it and the failure surfaces from the transport.
#[derive(Clone)]
pub struct BearerAuth {
    source: Arc<dyn TokenSource>,
}

impl BearerAuth {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self { source }
    }

    /// Adds the Authorization header when a token is available.
    pub fn apply(&self, ctx: &SyncContext, request: &mut OutgoingRequest) {
        match self.source.token(ctx) {
            Ok(token) => {
                request.set_header("Authorization", format!("Bearer {}", token.expose_secret()))
            }
            Err(e) => {
                tracing::warn!("Bearer token unavailable, sending request without it: {}", e)
            }
        }
    }
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth").finish_non_exhaustive()
    }
}
