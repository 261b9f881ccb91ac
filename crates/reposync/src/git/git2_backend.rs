//! libgit2-backed implementation of the git backend.

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use git2::build::CheckoutBuilder;
use git2::{
    AutotagOption, CertificateCheckStatus, Cred, CredentialType, ErrorClass, ErrorCode,
    FetchOptions, ObjectType, Oid, RemoteCallbacks, Repository, SubmoduleUpdateOptions,
};
use secrecy::ExposeSecret;

use super::backend::{
    CheckoutRequest, CheckoutTarget, CloneRequest, FetchRequest, GitBackend, GitWorktree,
    DEFAULT_SUBMODULE_DEPTH,
};
use super::error::{classify_message, BackendError, Result};
use super::refs::REMOTE_NAME;
use crate::auth::{fingerprint_sha256, format_fingerprint, AuthStrategy, OutgoingRequest};
use crate::context::SyncContext;

/// Credential callbacks are retried by libgit2 after a rejection; stop
/// before it loops forever on bad credentials.
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// Git backend built on libgit2.
#[derive(Debug, Clone)]
pub struct Git2Backend {
    submodule_depth: u32,
}

impl Git2Backend {
    pub fn new() -> Self {
        Self {
            submodule_depth: DEFAULT_SUBMODULE_DEPTH,
        }
    }

    /// Depth of submodule recursion for repositories opened by this backend.
    pub fn with_submodule_depth(mut self, depth: u32) -> Self {
        self.submodule_depth = depth;
        self
    }
}

impl Default for Git2Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl GitBackend for Git2Backend {
    fn open(&self, path: &Path) -> Result<Box<dyn GitWorktree>> {
        match Repository::open(path) {
            Ok(repo) => Ok(Box::new(Git2Worktree::new(repo, self.submodule_depth))),
            Err(e) if e.code() == ErrorCode::NotFound => {
                Err(BackendError::RepositoryNotFound(path.to_path_buf()))
            }
            Err(e) => Err(classify_message(e.message())),
        }
    }

    fn clone_repository(
        &self,
        ctx: &SyncContext,
        request: &CloneRequest<'_>,
    ) -> Result<Box<dyn GitWorktree>> {
        if ctx.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        fs::create_dir_all(request.path).map_err(|source| BackendError::Io {
            path: request.path.to_path_buf(),
            source,
        })?;
        let repo = Repository::init(request.path).map_err(|e| classify_message(e.message()))?;

        let single = request.reference.filter(|_| request.single_branch);
        {
            let mut remote = match single {
                Some(reference) => {
                    repo.remote_with_fetch(REMOTE_NAME, request.url, &reference.single_refspec())
                }
                None => repo.remote(REMOTE_NAME, request.url),
            }
            .map_err(|e| classify_message(e.message()))?;

            let signed = sign(ctx, request.auth);
            let host_key_error = RefCell::new(None);
            let mut options = fetch_options(ctx, request.auth, &signed, &host_key_error);
            if single.is_some() {
                options.download_tags(AutotagOption::None);
            }

            log::debug!("Fetching {} into {}", request.url, request.path.display());
            remote
                .fetch::<&str>(&[], Some(&mut options), None)
                .map_err(|e| classify(ctx, &e, &host_key_error))?;
        }

        let mut worktree = Git2Worktree::new(repo, self.submodule_depth);
        worktree.auth = request.auth.cloned();

        if !request.no_checkout {
            if let Some(reference) = request.reference {
                let target = CheckoutTarget::Branch(reference.checkout_ref());
                worktree.checkout(
                    ctx,
                    &CheckoutRequest {
                        target: &target,
                        force: true,
                        offline: false,
                    },
                )?;
            }
        }
        Ok(Box::new(worktree))
    }
}

/// An opened libgit2 repository.
pub struct Git2Worktree {
    repo: Repository,
    submodule_depth: u32,
    /// Strategy of the last clone or fetch, reused for submodule updates.
    auth: Option<AuthStrategy>,
}

impl Git2Worktree {
    fn new(repo: Repository, submodule_depth: u32) -> Self {
        Self {
            repo,
            submodule_depth,
            auth: None,
        }
    }

    fn resolve_target(&self, target: &CheckoutTarget) -> Result<Oid> {
        let object = match target {
            CheckoutTarget::Commit(hash) => self.repo.revparse_single(&format!("{}^{{commit}}", hash)),
            CheckoutTarget::Branch(name) => self
                .repo
                .find_reference(name)
                .and_then(|reference| reference.peel(ObjectType::Commit)),
        };
        match object {
            Ok(object) => Ok(object.id()),
            Err(e) if e.code() == ErrorCode::NotFound => {
                Err(BackendError::ObjectNotFound(target.to_string()))
            }
            Err(e) => Err(classify_message(e.message())),
        }
    }
}

impl GitWorktree for Git2Worktree {
    fn fetch(&mut self, ctx: &SyncContext, request: &FetchRequest<'_>) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        let refspecs: Vec<&str> = request
            .refspecs
            .iter()
            .map(|spec| {
                if request.force {
                    spec.as_str()
                } else {
                    spec.trim_start_matches('+')
                }
            })
            .collect();

        let signed = sign(ctx, request.auth);
        let host_key_error = RefCell::new(None);
        {
            let mut remote = self
                .repo
                .find_remote(REMOTE_NAME)
                .map_err(|e| classify_message(e.message()))?;
            let mut options = fetch_options(ctx, request.auth, &signed, &host_key_error);
            remote
                .fetch(&refspecs, Some(&mut options), None)
                .map_err(|e| classify(ctx, &e, &host_key_error))?;
        }

        self.auth = request.auth.cloned();
        Ok(())
    }

    fn checkout(&mut self, ctx: &SyncContext, request: &CheckoutRequest<'_>) -> Result<()> {
        let target = request.target;
        let oid = self.resolve_target(target)?;
        let object = self
            .repo
            .find_object(oid, None)
            .map_err(|e| classify_message(e.message()))?;

        let mut builder = CheckoutBuilder::new();
        if request.force {
            builder.force();
        } else {
            builder.safe();
        }
        self.repo
            .checkout_tree(&object, Some(&mut builder))
            .map_err(|e| classify_message(e.message()))?;
        self.repo
            .set_head_detached(oid)
            .map_err(|e| classify_message(e.message()))?;

        log::debug!("Checked out {} at {}", target, oid);
        let submodules = SubmoduleUpdate {
            auth: self.auth.as_ref(),
            offline: request.offline,
        };
        submodules.run(ctx, &self.repo, self.submodule_depth)
    }
}

/// Signs one network operation; the strategy is applied once, up front.
fn sign(ctx: &SyncContext, auth: Option<&AuthStrategy>) -> OutgoingRequest {
    auth.map(|strategy| strategy.sign(ctx)).unwrap_or_default()
}

fn fetch_options<'a>(
    ctx: &'a SyncContext,
    auth: Option<&'a AuthStrategy>,
    signed: &'a OutgoingRequest,
    host_key_error: &'a RefCell<Option<String>>,
) -> FetchOptions<'a> {
    let mut callbacks = RemoteCallbacks::new();

    let mut attempts = 0;
    callbacks.credentials(move |_url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str(
                "authentication failed: credentials rejected by remote",
            ));
        }

        let ssh = auth.and_then(AuthStrategy::ssh);
        if allowed.contains(CredentialType::SSH_KEY) {
            if let Some(ssh) = ssh {
                let username = username_from_url.unwrap_or(ssh.username());
                return Cred::ssh_key_from_memory(
                    username,
                    None,
                    ssh.private_key_pem(),
                    ssh.passphrase(),
                );
            }
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            if let Some(basic) = signed.basic_auth() {
                return Cred::userpass_plaintext(&basic.username, basic.password.expose_secret());
            }
        }
        if allowed.contains(CredentialType::USERNAME) {
            let fallback = ssh.map_or("git", |ssh| ssh.username());
            return Cred::username(username_from_url.unwrap_or(fallback));
        }
        Err(git2::Error::from_str(
            "authentication failed: no credentials available for this remote",
        ))
    });

    callbacks.certificate_check(move |cert, host| {
        let (Some(ssh), Some(hostkey)) = (auth.and_then(AuthStrategy::ssh), cert.as_hostkey())
        else {
            return Ok(CertificateCheckStatus::CertificatePassthrough);
        };

        let digest = match hostkey.hostkey() {
            Some(raw) => fingerprint_sha256(raw),
            None => match hostkey.hash_sha256() {
                Some(hash) => *hash,
                None => {
                    *host_key_error.borrow_mut() =
                        Some(format!("{} did not present a SHA-256 host key", host));
                    return Err(git2::Error::from_str("host key unavailable"));
                }
            },
        };

        match ssh.allowlist().verify_digest(&digest) {
            Ok(()) => Ok(CertificateCheckStatus::CertificateOk),
            Err(e) => {
                tracing::warn!(host, fingerprint = %format_fingerprint(&digest), "Rejected SSH host key");
                *host_key_error.borrow_mut() = Some(format!("{}: {}", host, e));
                Err(git2::Error::from_str("host key verification failed"))
            }
        }
    });

    callbacks.transfer_progress(move |_| !ctx.is_cancelled());
    callbacks.sideband_progress(move |_| !ctx.is_cancelled());

    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    if !signed.headers().is_empty() {
        let lines = signed.header_lines();
        let headers: Vec<&str> = lines.iter().map(String::as_str).collect();
        options.custom_headers(&headers);
    }
    options
}

fn classify(
    ctx: &SyncContext,
    error: &git2::Error,
    host_key_error: &RefCell<Option<String>>,
) -> BackendError {
    if let Some(message) = host_key_error.borrow_mut().take() {
        return BackendError::HostKeyRejected(message);
    }
    if ctx.is_cancelled() {
        return BackendError::Cancelled;
    }
    match (error.code(), error.class()) {
        (ErrorCode::Auth, _) => BackendError::Authentication(error.message().to_string()),
        (ErrorCode::Certificate, _) => BackendError::HostKeyRejected(error.message().to_string()),
        (_, ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Ssl) => {
            match classify_message(error.message()) {
                BackendError::Operation(message) => BackendError::Network(message),
                classified => classified,
            }
        }
        _ => classify_message(error.message()),
    }
}

/// How submodules are brought in line after a checkout.
struct SubmoduleUpdate<'a> {
    auth: Option<&'a AuthStrategy>,
    /// Use only objects already present in each submodule repository.
    offline: bool,
}

impl SubmoduleUpdate<'_> {
    fn run(&self, ctx: &SyncContext, repo: &Repository, depth: u32) -> Result<()> {
        if depth == 0 {
            return Ok(());
        }
        let submodules = repo
            .submodules()
            .map_err(|e| classify_message(e.message()))?;

        for mut submodule in submodules {
            if ctx.is_cancelled() {
                return Err(BackendError::Cancelled);
            }
            let name = submodule.name().unwrap_or("<non-utf8>").to_string();

            if self.offline {
                // An uninitialized submodule would have to be cloned
                if submodule.open().is_err() {
                    return Err(BackendError::ObjectNotFound(format!("submodule {}", name)));
                }
                log::debug!("Updating submodule {} from local objects", name);
            } else {
                log::debug!("Updating submodule {}", name);
            }

            let signed = if self.offline {
                OutgoingRequest::default()
            } else {
                sign(ctx, self.auth)
            };
            let host_key_error = RefCell::new(None);
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            let mut options = SubmoduleUpdateOptions::new();
            options.checkout(checkout).allow_fetch(!self.offline);
            if !self.offline {
                options.fetch(fetch_options(ctx, self.auth, &signed, &host_key_error));
            }

            submodule
                .update(!self.offline, Some(&mut options))
                .map_err(|e| match e.code() {
                    ErrorCode::NotFound if self.offline => {
                        BackendError::ObjectNotFound(format!("submodule {}", name))
                    }
                    _ => classify(ctx, &e, &host_key_error),
                })?;

            let nested = submodule
                .open()
                .map_err(|e| classify_message(e.message()))?;
            self.run(ctx, &nested, depth - 1)?;
        }
        Ok(())
    }
}
