//! OAuth2 client-credentials token source (RFC 6749 §4.4).
//!
//! Used for git servers fronted by an OIDC provider: the synchronizer
//! authenticates as itself and presents the access token as a bearer token.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::bearer::TokenSource;
use super::error::{AuthError, Result};
use crate::context::SyncContext;

/// Default connect timeout for token requests.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default request timeout for token requests.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tokens are refreshed this long before the provider says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Maximum length for error bodies kept in error messages.
const MAX_ERROR_BODY_LENGTH: usize = 200;

fn sanitize_error_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: SecretString,
    refresh_at: Option<Instant>,
}

/// Fetches access tokens with the client-credentials grant.
pub struct ClientCredentialsSource {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    scopes: Vec<String>,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientCredentialsSource {
    /// Creates a token source for the given token endpoint.
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
        scopes: Vec<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret,
            scopes,
            cached: Mutex::new(None),
        })
    }

    /// Returns the token endpoint URL.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    fn request_token(&self) -> Result<CachedToken> {
        let scope = self.scopes.join(" ");
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
        ];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }

        let response = self.client.post(&self.token_url).form(&form).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AuthError::TokenEndpoint {
                endpoint: self.token_url.clone(),
                message: format!("{}: {}", status, sanitize_error_body(&body)),
            });
        }

        let parsed: TokenResponse = response.json()?;
        if parsed.access_token.is_empty() {
            return Err(AuthError::TokenEndpoint {
                endpoint: self.token_url.clone(),
                message: "response did not contain an access token".to_string(),
            });
        }

        let refresh_at = parsed.expires_in.map(|secs| {
            Instant::now() + Duration::from_secs(secs).saturating_sub(EXPIRY_MARGIN)
        });
        log::debug!(
            "Fetched client-credentials token from {} (expires in {:?}s)",
            self.token_url,
            parsed.expires_in
        );

        Ok(CachedToken {
            token: SecretString::from(parsed.access_token),
            refresh_at,
        })
    }
}

impl TokenSource for ClientCredentialsSource {
    fn token(&self, ctx: &SyncContext) -> Result<SecretString> {
        let mut cached = self.cached.lock().map_err(|_| AuthError::CachePoisoned)?;

        if let Some(current) = cached.as_ref() {
            let fresh = current
                .refresh_at
                .map_or(true, |refresh_at| Instant::now() < refresh_at);
            if fresh {
                return Ok(current.token.clone());
            }
        }

        if ctx.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        let fetched = self.request_token()?;
        let token = fetched.token.clone();
        *cached = Some(fetched);
        Ok(token)
    }
}
