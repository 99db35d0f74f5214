//! # Identity
//!
//! Credential resolution and the per-credential ARM connection cache.

mod cache;
mod connection;
mod credentials;

pub use cache::{ArmClientFactory, ConnectionCache, GenericClientFactory};
pub use connection::Connection;
pub use credentials::{
    AuthMethod, ConnectionError, Credential, CredentialMaterial, CredentialProvider,
    CredentialSource, KubeCredentialProvider,
};
