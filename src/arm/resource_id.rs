//! # ARM Resource IDs
//!
//! Fully-qualified ARM resource IDs such as
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Storage/storageAccounts/{name}`.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArmIdError {
    #[error("resource ID {0:?} is not subscription scoped")]
    NotSubscriptionScoped(String),
    #[error("resource ID {0:?} has an odd number of segments")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArmId {
    raw: String,
    subscription_id: String,
    resource_group: Option<String>,
}

impl ArmId {
    pub fn parse(id: &str) -> Result<Self, ArmIdError> {
        let trimmed = id.trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').skip(1).collect();
        if trimmed.is_empty() || !trimmed.starts_with('/') || segments.len() % 2 != 0 {
            return Err(ArmIdError::Malformed(id.to_string()));
        }

        let mut pairs = segments.chunks(2);
        let subscription_id = match pairs.next() {
            Some([key, value]) if key.eq_ignore_ascii_case("subscriptions") && !value.is_empty() => {
                (*value).to_string()
            }
            _ => return Err(ArmIdError::NotSubscriptionScoped(id.to_string())),
        };
        let resource_group = match pairs.next() {
            Some([key, value]) if key.eq_ignore_ascii_case("resourceGroups") => {
                Some((*value).to_string())
            }
            _ => None,
        };

        Ok(Self {
            raw: trimmed.to_string(),
            subscription_id,
            resource_group,
        })
    }

    pub fn for_resource_group(subscription_id: &str, name: &str) -> Self {
        Self {
            raw: format!("/subscriptions/{subscription_id}/resourceGroups/{name}"),
            subscription_id: subscription_id.to_string(),
            resource_group: Some(name.to_string()),
        }
    }

    /// ID of a provider resource nested under this one
    ///
    /// `resource_type` is the full ARM type, e.g. `Microsoft.Storage/storageAccounts`.
    pub fn child(&self, resource_type: &str, name: &str) -> Self {
        Self {
            raw: format!("{}/providers/{}/{}", self.raw, resource_type, name),
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group(&self) -> Option<&str> {
        self.resource_group.as_deref()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for ArmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
