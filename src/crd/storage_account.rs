//! # StorageAccount
//!
//! An Azure storage account living in a `ResourceGroup` of the same namespace.
//!
//! ```yaml
//! apiVersion: storage.azure.com/v1
//! kind: StorageAccount
//! metadata:
//!   name: app-storage
//!   namespace: team-a
//! spec:
//!   azureName: teamaappstorage
//!   owner:
//!     name: app-rg
//!   location: westeurope
//!   kind: StorageV2
//!   sku:
//!     name: Standard_LRS
//!   operatorSpec:
//!     secrets:
//!       key1:
//!         name: app-storage-keys
//!         key: key1
//! ```

use super::resource_group::{string_at, tags_from};
use super::{ArmResource, OperatorSpec, SecretDestination};
use crate::arm::ArmId;
use crate::conditions::Condition;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "StorageAccount",
    group = "storage.azure.com",
    version = "v1",
    namespaced,
    status = "StorageAccountStatus",
    shortname = "sa",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}, {"name":"State", "type":"string", "jsonPath":".status.provisioningState"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccountSpec {
    /// Name of the storage account in Azure (3-24 lowercase letters and digits)
    #[serde(default)]
    pub azure_name: String,
    /// The `ResourceGroup` this account lives in
    pub owner: KnownResourceReference,
    pub location: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub sku: Sku,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_tier: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_spec: Option<StorageAccountOperatorSpec>,
}

fn default_kind() -> String {
    "StorageV2".to_string()
}

/// Reference to another resource in the same namespace, by name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct KnownResourceReference {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    /// e.g. `Standard_LRS`, `Premium_ZRS`
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccountOperatorSpec {
    #[serde(flatten)]
    pub expressions: OperatorSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<StorageAccountOperatorSecrets>,
}

/// Where to write the account's access keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccountOperatorSecrets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key1: Option<SecretDestination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key2: Option<SecretDestination>,
}

impl StorageAccountOperatorSecrets {
    pub fn is_empty(&self) -> bool {
        self.key1.is_none() && self.key2.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccountStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    /// Endpoint per service (blob, queue, table, file, web, dfs)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub primary_endpoints: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl StorageAccount {
    pub fn key_secrets(&self) -> Option<&StorageAccountOperatorSecrets> {
        self.spec
            .operator_spec
            .as_ref()
            .and_then(|o| o.secrets.as_ref())
            .filter(|s| !s.is_empty())
    }

    pub fn provisioning_state(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.provisioning_state.as_deref())
    }
}

impl ArmResource for StorageAccount {
    const RESOURCE_TYPE: &'static str = "Microsoft.Storage/storageAccounts";
    const API_VERSION: &'static str = "2023-01-01";

    fn azure_name(&self) -> &str {
        &self.spec.azure_name
    }

    fn owner(&self) -> Option<&str> {
        Some(self.spec.owner.name.as_str())
    }

    fn resource_id(&self, _subscription_id: &str, owner: Option<&ArmId>) -> Option<ArmId> {
        owner.map(|rg| rg.child(Self::RESOURCE_TYPE, &self.spec.azure_name))
    }

    fn to_arm(&self) -> Value {
        let mut body = Map::new();
        body.insert("location".to_string(), json!(self.spec.location));
        body.insert("kind".to_string(), json!(self.spec.kind));
        let mut sku = Map::new();
        sku.insert("name".to_string(), json!(self.spec.sku.name));
        if let Some(tier) = &self.spec.sku.tier {
            sku.insert("tier".to_string(), json!(tier));
        }
        body.insert("sku".to_string(), Value::Object(sku));
        if !self.spec.tags.is_empty() {
            body.insert("tags".to_string(), json!(self.spec.tags));
        }
        let mut properties = Map::new();
        if let Some(tier) = &self.spec.access_tier {
            properties.insert("accessTier".to_string(), json!(tier));
        }
        body.insert("properties".to_string(), Value::Object(properties));
        Value::Object(body)
    }

    fn set_arm_status(&mut self, body: &Value) {
        let status = self
            .status
            .get_or_insert_with(StorageAccountStatus::default);
        status.id = string_at(body, "/id");
        status.name = string_at(body, "/name");
        status.location = string_at(body, "/location");
        status.kind = string_at(body, "/kind");
        status.sku = body
            .get("sku")
            .and_then(|sku| serde_json::from_value(sku.clone()).ok());
        status.access_tier = string_at(body, "/properties/accessTier");
        status.provisioning_state = string_at(body, "/properties/provisioningState");
        status.primary_endpoints = body
            .pointer("/properties/primaryEndpoints")
            .and_then(Value::as_object)
            .map(|endpoints| {
                endpoints
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        status.tags = tags_from(body);
    }

    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self
            .status
            .get_or_insert_with(StorageAccountStatus::default)
            .conditions
    }

    fn operator_spec(&self) -> Option<&OperatorSpec> {
        self.spec.operator_spec.as_ref().map(|o| &o.expressions)
    }
}
