//! # Reference Resolution
//!
//! Turns a managed object into what ARM needs: its fully-qualified ID,
//! which for child resources depends on the owning `ResourceGroup`, and
//! the PUT body.

use super::annotations;
use super::types::ReconcilerError;
use crate::arm::ArmId;
use crate::conditions::{ReadyConditionImpactingError, reasons};
use crate::crd::{ArmResource, ResourceGroup};
use crate::identity::Connection;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Api, Client, Resource};
use serde_json::Value;
use std::fmt;

/// The owning `ResourceGroup`, as far as it is known
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOwner {
    /// Absent until the owner has been created in Azure
    pub arm_id: Option<ArmId>,
    pub owner_reference: OwnerReference,
}

#[async_trait]
pub trait ReferenceResolver: Send + Sync + fmt::Debug {
    async fn resolve_owner(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ResolvedOwner, ReconcilerError>;
}

pub struct KubeReferenceResolver {
    client: Client,
}

impl fmt::Debug for KubeReferenceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeReferenceResolver").finish_non_exhaustive()
    }
}

impl KubeReferenceResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// ARM ID recorded on a `ResourceGroup`, preferring the annotation
pub fn owner_arm_id(group: &ResourceGroup) -> Result<Option<ArmId>, ReconcilerError> {
    let recorded = annotations::get_resource_id(group).or_else(|| {
        group
            .status
            .as_ref()
            .and_then(|s| s.id.as_deref())
            .filter(|id| !id.is_empty())
    });
    Ok(recorded.map(ArmId::parse).transpose()?)
}

#[async_trait]
impl ReferenceResolver for KubeReferenceResolver {
    async fn resolve_owner(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ResolvedOwner, ReconcilerError> {
        let api: Api<ResourceGroup> = Api::namespaced(self.client.clone(), namespace);
        let group = api.get_opt(name).await?.ok_or_else(|| {
            ReadyConditionImpactingError::warning(
                reasons::REFERENCE_NOT_FOUND,
                format!("owner ResourceGroup {namespace}/{name} does not exist"),
            )
        })?;
        let owner_reference = group.owner_ref(&()).ok_or_else(|| {
            ReadyConditionImpactingError::warning(
                reasons::REFERENCE_NOT_FOUND,
                format!("owner ResourceGroup {namespace}/{name} has no uid"),
            )
        })?;
        Ok(ResolvedOwner {
            arm_id: owner_arm_id(&group)?,
            owner_reference,
        })
    }
}

/// Resolve the ARM ID and build the PUT body for `obj`
///
/// # Errors
/// `WaitingForOwner` while the owner has not been created in Azure yet,
/// `ReferenceNotFound` when the owner does not exist at all.
pub async fn convert_to_arm<K: ArmResource>(
    obj: &K,
    resolver: &dyn ReferenceResolver,
    connection: &Connection,
) -> Result<(ArmId, Value), ReconcilerError> {
    let owner_id = match obj.owner() {
        Some(owner) => {
            let namespace = obj.meta().namespace.as_deref().unwrap_or("default");
            let resolved = resolver.resolve_owner(namespace, owner).await?;
            let id = resolved.arm_id.ok_or_else(|| {
                ReadyConditionImpactingError::warning(
                    reasons::WAITING_FOR_OWNER,
                    format!("owner ResourceGroup {namespace}/{owner} has not been created in Azure yet"),
                )
            })?;
            Some(id)
        }
        None => None,
    };
    let id = obj
        .resource_id(connection.subscription_id(), owner_id.as_ref())
        .ok_or_else(|| ReconcilerError::UnresolvedResourceId(obj.azure_name().to_string()))?;
    Ok((id, obj.to_arm()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ResourceGroupSpec;

    fn group() -> ResourceGroup {
        ResourceGroup::new(
            "app-rg",
            ResourceGroupSpec {
                azure_name: "app-rg".to_string(),
                location: "westeurope".to_string(),
                tags: Default::default(),
                managed_by: None,
                operator_spec: None,
            },
        )
    }

    #[test]
    fn test_owner_arm_id_prefers_annotation() {
        let mut rg = group();
        assert_eq!(owner_arm_id(&rg).unwrap(), None);

        rg.status = Some(crate::crd::ResourceGroupStatus {
            id: Some("/subscriptions/s/resourceGroups/from-status".to_string()),
            ..Default::default()
        });
        assert_eq!(
            owner_arm_id(&rg).unwrap().map(|id| id.resource_group().map(str::to_string)),
            Some(Some("from-status".to_string()))
        );

        annotations::set_resource_id(&mut rg, "/subscriptions/s/resourceGroups/from-annotation");
        assert_eq!(
            owner_arm_id(&rg).unwrap().map(|id| id.to_string()),
            Some("/subscriptions/s/resourceGroups/from-annotation".to_string())
        );
    }

    #[test]
    fn test_owner_arm_id_rejects_garbage() {
        let mut rg = group();
        annotations::set_resource_id(&mut rg, "not-an-id");
        assert!(matches!(
            owner_arm_id(&rg),
            Err(ReconcilerError::ResourceId(_))
        ));
    }
}
