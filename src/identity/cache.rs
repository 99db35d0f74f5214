//! # Connection Cache
//!
//! One ARM client per credential source, shared by every resource using that
//! source. Entries are built lazily and replaced when the credential's
//! material changes; they are never evicted otherwise.

use super::connection::Connection;
use super::credentials::{
    AuthMethod, ConnectionError, Credential, CredentialMaterial, CredentialProvider,
    CredentialSource,
};
use crate::arm::{ArmClient, GenericClient};
use crate::controller::reconciler::annotations;
use crate::observability::metrics;
use azure_core::credentials::{Secret, TokenCredential};
use azure_identity::{
    ClientSecretCredential, ManagedIdentityCredential, WorkloadIdentityCredential,
    WorkloadIdentityCredentialOptions,
};
use kube::Resource;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// Builds the ARM client for a freshly resolved credential
pub trait ArmClientFactory: Send + Sync + fmt::Debug {
    fn build(&self, credential: &Credential) -> Result<Arc<dyn ArmClient>, ConnectionError>;
}

/// Builds `GenericClient`s authenticated through `azure_identity`
#[derive(Debug, Clone)]
pub struct GenericClientFactory {
    endpoint: String,
    timeout: Duration,
}

impl GenericClientFactory {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    fn token_credential(
        credential: &Credential,
    ) -> Result<Arc<dyn TokenCredential>, azure_core::Error> {
        let material = credential.material();
        let token: Arc<dyn TokenCredential> = match credential.auth_method() {
            AuthMethod::ClientSecret => ClientSecretCredential::new(
                material.tenant_id().unwrap_or_default(),
                material.client_id().unwrap_or_default().to_string(),
                Secret::new(material.client_secret().unwrap_or_default().to_string()),
                None,
            )?,
            AuthMethod::WorkloadIdentity => {
                let options = WorkloadIdentityCredentialOptions {
                    client_id: material.client_id().map(str::to_string),
                    ..Default::default()
                };
                WorkloadIdentityCredential::new(Some(options))?
            }
            AuthMethod::ManagedIdentity => ManagedIdentityCredential::new(None)?,
        };
        Ok(token)
    }
}

impl ArmClientFactory for GenericClientFactory {
    fn build(&self, credential: &Credential) -> Result<Arc<dyn ArmClient>, ConnectionError> {
        let client_error = |message: String| ConnectionError::Client {
            source_name: credential.source().to_string(),
            message,
        };
        let token = Self::token_credential(credential).map_err(|e| client_error(e.to_string()))?;
        let client = GenericClient::new(&self.endpoint, token, self.timeout)
            .map_err(|e| client_error(e.to_string()))?;
        Ok(Arc::new(client))
    }
}

struct CachedConnection {
    material: CredentialMaterial,
    connection: Arc<Connection>,
}

pub struct ConnectionCache {
    provider: Arc<dyn CredentialProvider>,
    factory: Arc<dyn ArmClientFactory>,
    entries: Mutex<HashMap<CredentialSource, CachedConnection>>,
}

impl fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("provider", &self.provider)
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

impl ConnectionCache {
    pub fn new(provider: Arc<dyn CredentialProvider>, factory: Arc<dyn ArmClientFactory>) -> Self {
        Self {
            provider,
            factory,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Connection for the credential `obj` resolves to
    ///
    /// # Errors
    /// Returns an error if the credential cannot be resolved or the client
    /// cannot be built
    pub async fn get_connection<K>(&self, obj: &K) -> Result<Arc<Connection>, ConnectionError>
    where
        K: Resource + Sync,
    {
        let namespace = obj.meta().namespace.clone().unwrap_or_default();
        let credential_from = annotations::credential_from(obj).map(str::to_string);
        let credential = self
            .provider
            .credential_for(&namespace, credential_from.as_deref())
            .await?;
        self.connection_for(&credential)
    }

    /// Cached connection for `credential`, rebuilt if its material changed
    ///
    /// # Errors
    /// Returns an error if a new client has to be built and building fails
    pub fn connection_for(&self, credential: &Credential) -> Result<Arc<Connection>, ConnectionError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(cached) = entries.get(credential.source()) {
            if cached.material == *credential.material() {
                return Ok(Arc::clone(&cached.connection));
            }
            info!(
                source = %credential.source(),
                "🔑 Credential changed, rebuilding ARM client"
            );
        }

        let client = self.factory.build(credential)?;
        metrics::increment_connections_built();
        let connection = Arc::new(Connection::new(
            client,
            credential.subscription_id(),
            credential.source().clone(),
        ));
        entries.insert(
            credential.source().clone(),
            CachedConnection {
                material: credential.material().clone(),
                connection: Arc::clone(&connection),
            },
        );
        Ok(connection)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map_or_else(|e| e.into_inner().len(), |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
