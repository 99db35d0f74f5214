//! # ResourceGroup
//!
//! An Azure resource group. Subscription scoped, so it never has an owner.
//!
//! ```yaml
//! apiVersion: resources.azure.com/v1
//! kind: ResourceGroup
//! metadata:
//!   name: app-rg
//!   namespace: team-a
//! spec:
//!   azureName: team-a-app
//!   location: westeurope
//!   tags:
//!     env: dev
//! ```

use super::{ArmResource, OperatorSpec};
use crate::arm::ArmId;
use crate::conditions::Condition;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ResourceGroup",
    group = "resources.azure.com",
    version = "v1",
    namespaced,
    status = "ResourceGroupStatus",
    shortname = "rg",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}, {"name":"Location", "type":"string", "jsonPath":".spec.location"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupSpec {
    /// Name of the resource group in Azure
    #[serde(default)]
    pub azure_name: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// ID of the resource that manages this resource group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_spec: Option<OperatorSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

pub(crate) fn string_at(body: &Value, pointer: &str) -> Option<String> {
    body.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn tags_from(body: &Value) -> BTreeMap<String, String> {
    body.get("tags")
        .and_then(Value::as_object)
        .map(|tags| {
            tags.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

impl ArmResource for ResourceGroup {
    const RESOURCE_TYPE: &'static str = "Microsoft.Resources/resourceGroups";
    const API_VERSION: &'static str = "2021-04-01";

    fn azure_name(&self) -> &str {
        &self.spec.azure_name
    }

    fn resource_id(&self, subscription_id: &str, _owner: Option<&ArmId>) -> Option<ArmId> {
        Some(ArmId::for_resource_group(subscription_id, &self.spec.azure_name))
    }

    fn to_arm(&self) -> Value {
        let mut body = Map::new();
        body.insert("location".to_string(), json!(self.spec.location));
        if !self.spec.tags.is_empty() {
            body.insert("tags".to_string(), json!(self.spec.tags));
        }
        if let Some(managed_by) = &self.spec.managed_by {
            body.insert("managedBy".to_string(), json!(managed_by));
        }
        Value::Object(body)
    }

    fn set_arm_status(&mut self, body: &Value) {
        let status = self.status.get_or_insert_with(ResourceGroupStatus::default);
        status.id = string_at(body, "/id");
        status.name = string_at(body, "/name");
        status.location = string_at(body, "/location");
        status.managed_by = string_at(body, "/managedBy");
        status.provisioning_state = string_at(body, "/properties/provisioningState");
        status.tags = tags_from(body);
    }

    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self
            .status
            .get_or_insert_with(ResourceGroupStatus::default)
            .conditions
    }

    fn operator_spec(&self) -> Option<&OperatorSpec> {
        self.spec.operator_spec.as_ref()
    }
}
