//! # Operator Spec
//!
//! Settings that tell the controller what to do with a resource beyond
//! reconciling it in Azure: which Secrets and ConfigMaps to publish.

use serde::{Deserialize, Serialize};

/// One exported value
///
/// `value` is a dotted path rooted at `self`, e.g. `self.status.id` or
/// `self.spec.location`. When `key` is omitted the path must point at an
/// object of scalars and every entry is exported under its own key.
///
/// ```yaml
/// configMapExpressions:
///   - name: rg-info
///     key: location
///     value: self.status.location
///   - name: rg-tags
///     value: self.spec.tags
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DestinationExpression {
    /// Name of the Secret or ConfigMap to write
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: String,
}

/// Fixed Secret destination for a well-known value, such as an access key
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretDestination {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperatorSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_map_expressions: Vec<DestinationExpression>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_expressions: Vec<DestinationExpression>,
}

impl OperatorSpec {
    pub fn is_empty(&self) -> bool {
        self.config_map_expressions.is_empty() && self.secret_expressions.is_empty()
    }
}
