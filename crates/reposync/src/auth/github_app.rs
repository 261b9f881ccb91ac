//! GitHub App installation tokens.
//!
//! An app authenticates as itself with a short-lived RS256 JWT signed by its
//! private key, then exchanges that JWT for an installation token scoped to
//! one installation. Git operations present the installation token as the
//! password of the fixed user `x-access-token`.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::blocking::Client;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::error::{AuthError, Result};
use super::request::OutgoingRequest;
use crate::context::SyncContext;

/// Public GitHub API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Username GitHub expects alongside an installation token.
pub const INSTALLATION_TOKEN_USER: &str = "x-access-token";

/// App JWTs are backdated to tolerate clock drift.
const JWT_BACKDATE_SECS: i64 = 60;

/// GitHub caps app JWT lifetime at ten minutes.
const JWT_LIFETIME_SECS: i64 = 9 * 60;

/// Installation tokens are reissued this long before they expire.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

struct InstallationToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

/// Issues installation tokens for one (app, installation, key) triple.
///
/// The transport reuses its current token until shortly before expiry and
/// then asks GitHub for a new one, so callers can request a token on every
/// operation.
pub struct InstallationTokenTransport {
    client: Client,
    api_base: String,
    integration_id: u64,
    installation_id: u64,
    signing_key: EncodingKey,
    current: Mutex<Option<InstallationToken>>,
}

impl InstallationTokenTransport {
    /// Builds a transport from a PEM-encoded RSA private key.
    ///
    /// Fails if the key cannot be parsed; no network call is made here.
    pub fn new(
        api_base: &str,
        integration_id: u64,
        installation_id: u64,
        private_key: &[u8],
    ) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(private_key)
            .map_err(|e| AuthError::InvalidPrivateKey(format!("GitHub App key: {}", e)))?;

        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .user_agent(concat!("reposync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            integration_id,
            installation_id,
            signing_key,
            current: Mutex::new(None),
        })
    }

    pub fn integration_id(&self) -> u64 {
        self.integration_id
    }

    pub fn installation_id(&self) -> u64 {
        self.installation_id
    }

    fn access_tokens_url(&self) -> String {
        format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base, self.installation_id
        )
    }

    /// Signs the app JWT used to request installation tokens.
    fn app_jwt(&self, now: DateTime<Utc>) -> Result<String> {
        let claims = AppClaims {
            iat: now.timestamp() - JWT_BACKDATE_SECS,
            exp: now.timestamp() + JWT_LIFETIME_SECS,
            iss: self.integration_id.to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| AuthError::InvalidPrivateKey(format!("failed to sign app JWT: {}", e)))
    }

    fn issue(&self) -> Result<InstallationToken> {
        let url = self.access_tokens_url();
        let jwt = self.app_jwt(Utc::now())?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(jwt)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or_else(|| status.to_string());
            return Err(AuthError::TokenEndpoint {
                endpoint: url,
                message: format!("{}: {}", status, message),
            });
        }

        let parsed: AccessTokenResponse = response.json()?;
        log::debug!(
            "Issued installation token for app {} installation {} (expires {})",
            self.integration_id,
            self.installation_id,
            parsed.expires_at
        );
        Ok(InstallationToken {
            token: SecretString::from(parsed.token),
            expires_at: parsed.expires_at,
        })
    }

    /// Returns a valid installation token, issuing a new one when needed.
    pub fn token(&self, ctx: &SyncContext) -> Result<SecretString> {
        let mut current = self.current.lock().map_err(|_| AuthError::CachePoisoned)?;

        if let Some(existing) = current.as_ref() {
            let refresh_at =
                existing.expires_at - chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
            if Utc::now() < refresh_at {
                return Ok(existing.token.clone());
            }
        }

        if ctx.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        let issued = self.issue()?;
        let token = issued.token.clone();
        *current = Some(issued);
        Ok(token)
    }
}

impl fmt::Debug for InstallationTokenTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationTokenTransport")
            .field("api_base", &self.api_base)
            .field("integration_id", &self.integration_id)
            .field("installation_id", &self.installation_id)
            .finish_non_exhaustive()
    }
}

/// The single cached transport and the key it was built from.
struct CachedInstallationToken {
    integration_id: u64,
    installation_id: u64,
    private_key: Vec<u8>,
    transport: Arc<InstallationTokenTransport>,
}

impl CachedInstallationToken {
    fn matches(&self, integration_id: u64, installation_id: u64, private_key: &[u8]) -> bool {
        self.integration_id == integration_id
            && self.installation_id == installation_id
            && self.private_key == private_key
    }
}

/// Single-slot cache of installation-token transports.
///
/// Keyed by (integration ID, installation ID, private key bytes). A request
/// with a different key replaces the slot wholesale; the previous transport
/// (and its token) is dropped. There is no TTL here, token freshness is the
/// transport's job.
pub struct GitHubAppTokenCache {
    api_base: String,
    slot: Mutex<Option<CachedInstallationToken>>,
}

impl GitHubAppTokenCache {
    /// Creates an empty cache talking to the public GitHub API.
    pub fn new() -> Self {
        Self::with_api_base(DEFAULT_API_BASE)
    }

    /// Creates an empty cache for a GitHub Enterprise API base URL.
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            slot: Mutex::new(None),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the cached transport for this key, building (and caching) a
    /// new one if the slot is empty or holds a different key.
    pub fn transport(
        &self,
        integration_id: u64,
        installation_id: u64,
        private_key: &[u8],
    ) -> Result<Arc<InstallationTokenTransport>> {
        let mut slot = self.slot.lock().map_err(|_| AuthError::CachePoisoned)?;

        if let Some(cached) = slot.as_ref() {
            if cached.matches(integration_id, installation_id, private_key) {
                return Ok(Arc::clone(&cached.transport));
            }
            log::debug!(
                "GitHub App key changed (app {} installation {}), rebuilding token transport",
                integration_id,
                installation_id
            );
        }

        let transport = Arc::new(InstallationTokenTransport::new(
            &self.api_base,
            integration_id,
            installation_id,
            private_key,
        )?);
        *slot = Some(CachedInstallationToken {
            integration_id,
            installation_id,
            private_key: private_key.to_vec(),
            transport: Arc::clone(&transport),
        });
        Ok(transport)
    }

    /// Returns a current installation token for the given key.
    ///
    /// The cache lock is released before the transport is asked for a token,
    /// so a slow token request does not block lookups for other keys.
    pub fn token(
        &self,
        ctx: &SyncContext,
        integration_id: u64,
        installation_id: u64,
        private_key: &[u8],
    ) -> Result<SecretString> {
        let transport = self.transport(integration_id, installation_id, private_key)?;
        transport.token(ctx)
    }
}

impl Default for GitHubAppTokenCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Authenticates as a GitHub App installation.
#[derive(Clone)]
pub struct GitHubAppAuth {
    cache: Arc<GitHubAppTokenCache>,
    integration_id: u64,
    installation_id: u64,
    private_key: Arc<[u8]>,
}

impl GitHubAppAuth {
    /// Validates the key by building (or reusing) its transport.
    pub fn new(
        cache: Arc<GitHubAppTokenCache>,
        integration_id: u64,
        installation_id: u64,
        private_key: Vec<u8>,
    ) -> Result<Self> {
        cache.transport(integration_id, installation_id, &private_key)?;
        Ok(Self {
            cache,
            integration_id,
            installation_id,
            private_key: private_key.into(),
        })
    }

    pub fn integration_id(&self) -> u64 {
        self.integration_id
    }

    pub fn installation_id(&self) -> u64 {
        self.installation_id
    }

    /// Sets `x-access-token:<installation token>` basic credentials, or
    /// leaves the request unsigned if no token can be obtained.
    pub fn apply(&self, ctx: &SyncContext, request: &mut OutgoingRequest) {
        match self.cache.token(
            ctx,
            self.integration_id,
            self.installation_id,
            &self.private_key,
        ) {
            Ok(token) => request.set_basic_auth(INSTALLATION_TOKEN_USER, token),
            Err(e) => tracing::warn!(
                integration_id = self.integration_id,
                installation_id = self.installation_id,
                "Installation token unavailable, sending request without it: {}",
                e
            ),
        }
    }
}

impl fmt::Debug for GitHubAppAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubAppAuth")
            .field("integration_id", &self.integration_id)
            .field("installation_id", &self.installation_id)
            .finish_non_exhaustive()
    }
}
