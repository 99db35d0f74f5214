//! # Connection
//!
//! An ARM client bound to one credential. Connections are owned by the
//! connection cache and borrowed by reconcilers for a single reconcile.

use super::credentials::CredentialSource;
use crate::arm::ArmClient;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Connection {
    client: Arc<dyn ArmClient>,
    subscription_id: String,
    credential_from: CredentialSource,
}

impl Connection {
    pub fn new(
        client: Arc<dyn ArmClient>,
        subscription_id: impl Into<String>,
        credential_from: CredentialSource,
    ) -> Self {
        Self {
            client,
            subscription_id: subscription_id.into(),
            credential_from,
        }
    }

    pub fn client(&self) -> &dyn ArmClient {
        self.client.as_ref()
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn credential_from(&self) -> &CredentialSource {
        &self.credential_from
    }
}
