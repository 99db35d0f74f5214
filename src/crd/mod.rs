//! # Custom Resource Definitions
//!
//! CRD types for the resources the controller reconciles into Azure.
//!
//! ## Module Structure
//!
//! - `resource_group.rs` - `ResourceGroup` (resources.azure.com/v1)
//! - `storage_account.rs` - `StorageAccount` (storage.azure.com/v1)
//! - `operator_spec.rs` - Secret/ConfigMap destinations shared by all kinds
//!
//! Every kind implements [`ArmResource`], which is all the reconciler needs
//! to know about it.

mod operator_spec;
mod resource_group;
mod storage_account;

pub use operator_spec::{DestinationExpression, OperatorSpec, SecretDestination};
pub use resource_group::{ResourceGroup, ResourceGroupSpec, ResourceGroupStatus};
pub use storage_account::{
    KnownResourceReference, Sku, StorageAccount, StorageAccountOperatorSecrets,
    StorageAccountOperatorSpec, StorageAccountSpec, StorageAccountStatus,
};

use crate::arm::ArmId;
use crate::conditions::Condition;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;

/// A Kubernetes resource backed by one ARM resource
pub trait ArmResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Fully-qualified ARM type, e.g. `Microsoft.Storage/storageAccounts`
    const RESOURCE_TYPE: &'static str;
    const API_VERSION: &'static str;

    /// Name of the resource in Azure; empty until defaulted
    fn azure_name(&self) -> &str;

    /// Name of the owning `ResourceGroup` in the same namespace
    fn owner(&self) -> Option<&str> {
        None
    }

    /// ARM ID this object maps to, given its resolved owner
    fn resource_id(&self, subscription_id: &str, owner: Option<&ArmId>) -> Option<ArmId>;

    /// Body of the PUT request
    fn to_arm(&self) -> Value;

    /// Copy the GET response into status, leaving conditions alone
    fn set_arm_status(&mut self, body: &Value);

    fn conditions(&self) -> &[Condition];

    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    fn operator_spec(&self) -> Option<&OperatorSpec> {
        None
    }

    /// Kinds whose ARM API has no GET are refreshed with HEAD instead
    fn supports_get(&self) -> bool {
        true
    }
}
