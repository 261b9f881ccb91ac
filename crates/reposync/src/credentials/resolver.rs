//! Credential reference to authentication strategy.

use std::fmt;
use std::fs;
use std::sync::Arc;

use secrecy::ExposeSecret;

use super::error::{CredentialError, Result};
use super::provider::{SecretProvider, TypedSecretResolver};
use super::spec::CredentialSpec;
use crate::auth::{
    AuthError, AuthStrategy, BasicAuth, BearerAuth, ClientCredentialsSource, GitHubAppAuth,
    GitHubAppTokenCache, SshKeyAuth, StaticToken,
};
use crate::context::SyncContext;
use crate::secrets::expand_home;

/// Turns named credential references into authentication strategies.
///
/// A resolver has at most one active lookup path. A generic
/// [`SecretProvider`] wins over a [`TypedSecretResolver`] when both are set.
/// Each resolver owns one GitHub App token cache, shared by every GitHub App
/// credential it resolves.
pub struct CredentialResolver {
    provider: Option<Arc<dyn SecretProvider>>,
    typed: Option<Arc<dyn TypedSecretResolver>>,
    app_tokens: Arc<GitHubAppTokenCache>,
}

impl CredentialResolver {
    /// Creates a resolver that can only serve anonymous access.
    pub fn new() -> Self {
        Self {
            provider: None,
            typed: None,
            app_tokens: Arc::new(GitHubAppTokenCache::new()),
        }
    }

    /// Uses a generic attribute-map provider for lookups.
    pub fn with_provider(mut self, provider: Arc<dyn SecretProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Uses a typed resolver for lookups (ignored if a provider is set).
    pub fn with_typed_resolver(mut self, resolver: Arc<dyn TypedSecretResolver>) -> Self {
        self.typed = Some(resolver);
        self
    }

    /// Points GitHub App token requests at another API base URL.
    pub fn with_github_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.app_tokens = Arc::new(GitHubAppTokenCache::with_api_base(api_base));
        self
    }

    /// The GitHub App token cache owned by this resolver.
    pub fn token_cache(&self) -> &Arc<GitHubAppTokenCache> {
        &self.app_tokens
    }

    /// Resolves an optional credential reference.
    ///
    /// `None` means anonymous access and yields no strategy.
    pub fn resolve(&self, ctx: &SyncContext, name: Option<&str>) -> Result<Option<AuthStrategy>> {
        let Some(name) = name else {
            return Ok(None);
        };
        let spec = self.lookup(ctx, name)?;
        tracing::debug!(credential = name, kind = spec.kind(), "Resolved credential");
        self.build(name, spec).map(Some)
    }

    fn lookup(&self, ctx: &SyncContext, name: &str) -> Result<CredentialSpec> {
        if let Some(provider) = &self.provider {
            let attributes = provider
                .get_secret(ctx, name)
                .map_err(|source| CredentialError::Lookup {
                    name: name.to_string(),
                    source,
                })?;
            return CredentialSpec::from_attributes(name, &attributes);
        }
        if let Some(typed) = &self.typed {
            return typed.resolve(ctx, name);
        }
        Err(CredentialError::NoResolver(name.to_string()))
    }

    /// Builds the strategy for a normalized credential.
    ///
    /// This is the only place strategies are constructed, whichever lookup
    /// path produced the credential.
    pub fn build(&self, name: &str, spec: CredentialSpec) -> Result<AuthStrategy> {
        let strategy_error = |kind: &'static str| {
            move |source: AuthError| CredentialError::Strategy {
                name: name.to_string(),
                kind,
                source,
            }
        };

        match spec {
            CredentialSpec::BasicAuth {
                username,
                password,
                headers,
            } => BasicAuth::new(username, password, headers)
                .map(AuthStrategy::Basic)
                .map_err(strategy_error("basic-auth")),

            CredentialSpec::GitHubApp {
                integration_id,
                installation_id,
                private_key_path,
            } => {
                let path = expand_home(&private_key_path);
                let private_key = fs::read(&path).map_err(|source| CredentialError::ReadKey {
                    name: name.to_string(),
                    path,
                    source,
                })?;
                GitHubAppAuth::new(
                    Arc::clone(&self.app_tokens),
                    integration_id,
                    installation_id,
                    private_key,
                )
                .map(AuthStrategy::GitHubApp)
                .map_err(strategy_error("github-app"))
            }

            CredentialSpec::SshKey {
                key,
                passphrase,
                fingerprints,
            } => SshKeyAuth::new(
                key.expose_secret(),
                passphrase.as_ref().map(|p| p.expose_secret()),
                &fingerprints,
            )
            .map(AuthStrategy::Ssh)
            .map_err(strategy_error("ssh-key")),

            CredentialSpec::OidcClientCredentials {
                token_url,
                client_id,
                client_secret,
                scopes,
            } => ClientCredentialsSource::new(token_url, client_id, client_secret, scopes)
                .map(|source| AuthStrategy::DynamicBearer(BearerAuth::new(Arc::new(source))))
                .map_err(strategy_error("dynamic-bearer")),

            CredentialSpec::Token { token } => Ok(AuthStrategy::StaticBearer(BearerAuth::new(
                Arc::new(StaticToken::new(token)),
            ))),
        }
    }
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("provider", &self.provider.is_some())
            .field("typed", &self.typed.is_some())
            .field("github_api_base", &self.app_tokens.api_base())
            .finish()
    }
}
