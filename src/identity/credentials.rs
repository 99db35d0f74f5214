//! # Credentials
//!
//! Azure credentials and where they come from.
//!
//! Resolution order for an object:
//! 1. the secret named by its `credential-from` annotation
//! 2. `aso-credential` in the object's namespace
//! 3. the global credential: the controller settings secret in the
//!    controller namespace, else the controller's own environment
//!
//! Secret keys: `AZURE_SUBSCRIPTION_ID` (required), `AZURE_TENANT_ID`,
//! `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`.

use crate::config::ControllerConfig;
use crate::conditions::{ReadyConditionImpactingError, reasons};
use crate::constants::NAMESPACE_CREDENTIAL_SECRET_NAME;
use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const SUBSCRIPTION_ID_KEY: &str = "AZURE_SUBSCRIPTION_ID";
pub const TENANT_ID_KEY: &str = "AZURE_TENANT_ID";
pub const CLIENT_ID_KEY: &str = "AZURE_CLIENT_ID";
pub const CLIENT_SECRET_KEY: &str = "AZURE_CLIENT_SECRET";

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("credential secret {namespace}/{name} does not exist")]
    SecretNotFound { namespace: String, name: String },
    #[error("credential from {source_name} is invalid: {message}")]
    InvalidCredential { source_name: String, message: String },
    #[error("failed to read credential secret: {0}")]
    Kube(#[from] kube::Error),
    #[error("failed to build ARM client for {source_name}: {message}")]
    Client { source_name: String, message: String },
}

impl ConnectionError {
    /// Missing or broken credentials are retried; someone may fix the secret
    pub fn to_ready_error(&self) -> ReadyConditionImpactingError {
        ReadyConditionImpactingError::warning(reasons::CREDENTIAL_INVALID, self)
    }
}

/// Logical identity of a credential, used as the connection cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CredentialSource {
    Global,
    Secret { namespace: String, name: String },
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Global => f.write_str("global"),
            CredentialSource::Secret { namespace, name } => write!(f, "{namespace}/{name}"),
        }
    }
}

/// Secret material of a credential, wiped from memory on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct CredentialMaterial {
    subscription_id: String,
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl fmt::Debug for CredentialMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialMaterial")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CredentialMaterial {
    pub fn new(
        subscription_id: impl Into<String>,
        tenant_id: Option<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            tenant_id,
            client_id,
            client_secret,
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }
}

/// Which token credential a credential's material selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    ClientSecret,
    WorkloadIdentity,
    ManagedIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    source: CredentialSource,
    material: CredentialMaterial,
}

impl Credential {
    pub fn new(source: CredentialSource, material: CredentialMaterial) -> Self {
        Self { source, material }
    }

    /// Build a credential from the data of a Kubernetes secret
    ///
    /// # Errors
    /// Returns `InvalidCredential` when the subscription ID is missing or a
    /// value is not UTF-8
    pub fn from_secret_data(
        source: CredentialSource,
        data: &BTreeMap<String, ByteString>,
    ) -> Result<Self, ConnectionError> {
        let read = |key: &str| -> Result<Option<String>, ConnectionError> {
            match data.get(key) {
                None => Ok(None),
                Some(value) => String::from_utf8(value.0.clone())
                    .map(|s| Some(s.trim().to_string()).filter(|s| !s.is_empty()))
                    .map_err(|_| ConnectionError::InvalidCredential {
                        source_name: source.to_string(),
                        message: format!("{key} is not valid UTF-8"),
                    }),
            }
        };

        let Some(subscription_id) = read(SUBSCRIPTION_ID_KEY)? else {
            return Err(ConnectionError::InvalidCredential {
                source_name: source.to_string(),
                message: format!("{SUBSCRIPTION_ID_KEY} is required"),
            });
        };
        let material = CredentialMaterial::new(
            subscription_id,
            read(TENANT_ID_KEY)?,
            read(CLIENT_ID_KEY)?,
            read(CLIENT_SECRET_KEY)?,
        );
        Ok(Self::new(source, material))
    }

    /// Global credential taken from the controller's own configuration
    ///
    /// # Errors
    /// Returns `InvalidCredential` when no subscription is configured
    pub fn from_config(config: &ControllerConfig) -> Result<Self, ConnectionError> {
        let Some(subscription_id) = config.azure_subscription_id.clone() else {
            return Err(ConnectionError::InvalidCredential {
                source_name: CredentialSource::Global.to_string(),
                message: format!(
                    "no global credential secret found and {SUBSCRIPTION_ID_KEY} is not set"
                ),
            });
        };
        let material = CredentialMaterial::new(
            subscription_id,
            config.azure_tenant_id.clone(),
            config.azure_client_id.clone(),
            None,
        );
        Ok(Self::new(CredentialSource::Global, material))
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    pub fn material(&self) -> &CredentialMaterial {
        &self.material
    }

    pub fn subscription_id(&self) -> &str {
        self.material.subscription_id()
    }

    pub fn auth_method(&self) -> AuthMethod {
        match (self.material.client_secret(), self.material.client_id()) {
            (Some(_), _) => AuthMethod::ClientSecret,
            (None, Some(_)) => AuthMethod::WorkloadIdentity,
            (None, None) => AuthMethod::ManagedIdentity,
        }
    }
}

/// Resolves the credential an object should use
#[async_trait]
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    /// `credential_from` is the value of the object's `credential-from` annotation
    async fn credential_for(
        &self,
        namespace: &str,
        credential_from: Option<&str>,
    ) -> Result<Credential, ConnectionError>;
}

/// Reads credentials from Kubernetes secrets
#[derive(Clone)]
pub struct KubeCredentialProvider {
    client: kube::Client,
    controller_namespace: String,
    global_secret_name: String,
    global_fallback: Option<Credential>,
    fallback_error: String,
}

impl fmt::Debug for KubeCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeCredentialProvider")
            .field("controller_namespace", &self.controller_namespace)
            .field("global_secret_name", &self.global_secret_name)
            .finish_non_exhaustive()
    }
}

impl KubeCredentialProvider {
    pub fn new(client: kube::Client, config: &ControllerConfig) -> Self {
        let (global_fallback, fallback_error) = match Credential::from_config(config) {
            Ok(credential) => (Some(credential), String::new()),
            Err(e) => (None, e.to_string()),
        };
        Self {
            client,
            controller_namespace: config.controller_namespace.clone(),
            global_secret_name: config.global_credential_secret_name.clone(),
            global_fallback,
            fallback_error,
        }
    }

    async fn read_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, ByteString>>, ConnectionError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets.get_opt(name).await?;
        Ok(secret.map(|s| s.data.unwrap_or_default()))
    }
}

#[async_trait]
impl CredentialProvider for KubeCredentialProvider {
    async fn credential_for(
        &self,
        namespace: &str,
        credential_from: Option<&str>,
    ) -> Result<Credential, ConnectionError> {
        if let Some(name) = credential_from {
            let source = CredentialSource::Secret {
                namespace: namespace.to_string(),
                name: name.to_string(),
            };
            return match self.read_secret(namespace, name).await? {
                Some(data) => Credential::from_secret_data(source, &data),
                None => Err(ConnectionError::SecretNotFound {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                }),
            };
        }

        if let Some(data) = self
            .read_secret(namespace, NAMESPACE_CREDENTIAL_SECRET_NAME)
            .await?
        {
            debug!(namespace, "Using namespace credential secret");
            let source = CredentialSource::Secret {
                namespace: namespace.to_string(),
                name: NAMESPACE_CREDENTIAL_SECRET_NAME.to_string(),
            };
            return Credential::from_secret_data(source, &data);
        }

        if let Some(data) = self
            .read_secret(&self.controller_namespace, &self.global_secret_name)
            .await?
        {
            return Credential::from_secret_data(CredentialSource::Global, &data);
        }

        self.global_fallback
            .clone()
            .ok_or_else(|| ConnectionError::InvalidCredential {
                source_name: CredentialSource::Global.to_string(),
                message: self.fallback_error.clone(),
            })
    }
}
