//! Credential lookup and strategy construction.
//!
//! Credentials are referenced by name from a sync target. The name is looked
//! up either through a generic [`SecretProvider`] (attribute maps with a
//! `type` discriminator) or a [`TypedSecretResolver`]; both produce a
//! [`CredentialSpec`], which [`CredentialResolver`] turns into an
//! [`AuthStrategy`](crate::auth::AuthStrategy).

mod error;
mod provider;
mod resolver;
mod spec;
mod store;

pub use error::{CredentialError, Result};
pub use provider::{SecretProvider, TypedSecretResolver};
pub use resolver::CredentialResolver;
pub use spec::{CredentialSpec, TYPE_ATTRIBUTE};
pub use store::ConfigSecretStore;
