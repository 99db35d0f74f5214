//! # Extension Points
//!
//! Kind-specific hooks the reconciler instance calls when a kind provides
//! them. A kind opts in by returning `Some` from the matching getter on
//! [`ResourceExtension`]; everything else falls back to generic behavior.
//!
//! | hook | called | default |
//! |---|---|---|
//! | `PreReconciliationChecker` | before a create/update is sent | proceed |
//! | `ArmResourceModifier` | on the PUT body | unchanged |
//! | `PostReconciliationChecker` | after the status refresh | success |
//! | `KubernetesExporter` / `SecretExporter` | after the checks | nothing exported |
//! | `SuccessHandler` | last step of success handling | no-op |
//! | `Deleter` | instead of the direct ARM delete | `DELETE {id}` |
//! | `Claimer` | when the finalizer is first added | no-op |

use super::exporters::{ExportKind, ExportedValue};
use super::types::ReconcilerError;
use crate::arm::{ArmId, CloudError, Poller};
use crate::conditions::{ReadyConditionImpactingError, reasons};
use crate::crd::{ArmResource, StorageAccount};
use crate::identity::Connection;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Outcome of a pre-reconciliation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreReconcileCheckResult {
    Proceed,
    /// Not now; return without error and without requeue
    Postpone,
    /// Do not contact ARM; surface the error as the Ready condition
    Block(ReadyConditionImpactingError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostReconcileCheckResult {
    Success,
    Failure(ReadyConditionImpactingError),
}

#[async_trait]
pub trait PreReconciliationChecker<K: ArmResource>: Send + Sync {
    async fn pre_reconcile_check(
        &self,
        obj: &K,
        connection: &Connection,
    ) -> Result<PreReconcileCheckResult, ReconcilerError>;
}

#[async_trait]
pub trait PostReconciliationChecker<K: ArmResource>: Send + Sync {
    async fn post_reconcile_check(
        &self,
        obj: &K,
        connection: &Connection,
    ) -> Result<PostReconcileCheckResult, ReconcilerError>;
}

#[async_trait]
pub trait ArmResourceModifier<K: ArmResource>: Send + Sync {
    async fn modify_arm_resource(
        &self,
        obj: &K,
        connection: &Connection,
        body: Value,
    ) -> Result<Value, ReconcilerError>;
}

#[async_trait]
pub trait Deleter<K: ArmResource>: Send + Sync {
    async fn delete(&self, obj: &K, id: &ArmId, connection: &Connection)
    -> Result<Poller, CloudError>;
}

/// Values for ConfigMaps derived from the reconciled resource
#[async_trait]
pub trait KubernetesExporter<K: ArmResource>: Send + Sync {
    async fn export_kubernetes_resources(
        &self,
        obj: &K,
        connection: &Connection,
    ) -> Result<Vec<ExportedValue>, ReconcilerError>;
}

/// Values for Secrets, typically read from ARM actions such as `listKeys`
#[async_trait]
pub trait SecretExporter<K: ArmResource>: Send + Sync {
    async fn export_secrets(
        &self,
        obj: &K,
        connection: &Connection,
    ) -> Result<Vec<ExportedValue>, ReconcilerError>;
}

#[async_trait]
pub trait SuccessHandler<K: ArmResource>: Send + Sync {
    async fn on_success(&self, obj: &mut K, connection: &Connection)
    -> Result<(), ReconcilerError>;
}

#[async_trait]
pub trait Claimer<K: ArmResource>: Send + Sync {
    async fn claim(&self, obj: &mut K) -> Result<(), ReconcilerError>;
}

/// The hooks one kind supports
pub trait ResourceExtension<K: ArmResource>: Send + Sync + fmt::Debug {
    fn pre_reconciliation_checker(&self) -> Option<&dyn PreReconciliationChecker<K>> {
        None
    }

    fn post_reconciliation_checker(&self) -> Option<&dyn PostReconciliationChecker<K>> {
        None
    }

    fn arm_resource_modifier(&self) -> Option<&dyn ArmResourceModifier<K>> {
        None
    }

    fn deleter(&self) -> Option<&dyn Deleter<K>> {
        None
    }

    fn kubernetes_exporter(&self) -> Option<&dyn KubernetesExporter<K>> {
        None
    }

    fn secret_exporter(&self) -> Option<&dyn SecretExporter<K>> {
        None
    }

    fn success_handler(&self) -> Option<&dyn SuccessHandler<K>> {
        None
    }

    fn claimer(&self) -> Option<&dyn Claimer<K>> {
        None
    }
}

/// Kind with no hooks at all
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExtension;

impl<K: ArmResource> ResourceExtension<K> for NoExtension {}

/// Hook errors keep a Ready condition they already carry; anything else is
/// wrapped as a Warning under `reason`
pub fn wrap_extension_error(err: ReconcilerError, reason: &str) -> ReconcilerError {
    match err {
        ReconcilerError::ReadyCondition(_) => err,
        other => ReconcilerError::ReadyCondition(ReadyConditionImpactingError::warning(
            reason, other,
        )),
    }
}

/// Storage accounts publish their access keys and are only settled once
/// ARM reports `Succeeded`
#[derive(Debug, Default, Clone, Copy)]
pub struct StorageAccountExtension;

impl ResourceExtension<StorageAccount> for StorageAccountExtension {
    fn post_reconciliation_checker(&self) -> Option<&dyn PostReconciliationChecker<StorageAccount>> {
        Some(self)
    }

    fn secret_exporter(&self) -> Option<&dyn SecretExporter<StorageAccount>> {
        Some(self)
    }
}

#[async_trait]
impl PostReconciliationChecker<StorageAccount> for StorageAccountExtension {
    async fn post_reconcile_check(
        &self,
        obj: &StorageAccount,
        _connection: &Connection,
    ) -> Result<PostReconcileCheckResult, ReconcilerError> {
        Ok(match obj.provisioning_state() {
            None | Some("Succeeded") => PostReconcileCheckResult::Success,
            Some(state) => PostReconcileCheckResult::Failure(ReadyConditionImpactingError::warning(
                reasons::POST_RECONCILIATION_CHECK_FAILED,
                format!("storage account provisioning state is {state}, expected Succeeded"),
            )),
        })
    }
}

#[async_trait]
impl SecretExporter<StorageAccount> for StorageAccountExtension {
    async fn export_secrets(
        &self,
        obj: &StorageAccount,
        connection: &Connection,
    ) -> Result<Vec<ExportedValue>, ReconcilerError> {
        let Some(secrets) = obj.key_secrets() else {
            return Ok(Vec::new());
        };
        let id = obj
            .status
            .as_ref()
            .and_then(|s| s.id.as_deref())
            .ok_or_else(|| {
                ReconcilerError::UnresolvedResourceId(format!(
                    "StorageAccount {}",
                    obj.spec.azure_name
                ))
            })?;
        let id = ArmId::parse(id)?;
        let body = connection
            .client()
            .invoke_action(&id, "listKeys", StorageAccount::API_VERSION)
            .await
            .map_err(|e| ReconcilerError::from_cloud(&e))?;

        let mut exported = Vec::new();
        for (key_name, destination) in [("key1", &secrets.key1), ("key2", &secrets.key2)] {
            let Some(destination) = destination else {
                continue;
            };
            let value = storage_key(&body, key_name).ok_or_else(|| {
                ReconcilerError::Extension(format!("listKeys response has no {key_name}"))
            })?;
            exported.push(ExportedValue {
                kind: ExportKind::Secret,
                name: destination.name.clone(),
                key: destination.key.clone(),
                value: value.to_string(),
            });
        }
        Ok(exported)
    }
}

/// `{"keys": [{"keyName": "key1", "value": "..."}]}`
fn storage_key<'a>(body: &'a Value, key_name: &str) -> Option<&'a str> {
    body.get("keys")?
        .as_array()?
        .iter()
        .find(|k| k.get("keyName").and_then(Value::as_str) == Some(key_name))
        .and_then(|k| k.get("value"))
        .and_then(Value::as_str)
}
