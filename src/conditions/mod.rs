//! # Conditions
//!
//! The Ready condition written to every managed resource, and the error type
//! that carries a desired Ready condition back to the generic controller.
//!
//! `lastTransitionTime` only moves when the condition status flips, so
//! repeated Warning updates with the same status do not churn the object.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Condition type summarising the reconcile outcome
pub const READY_CONDITION_TYPE: &str = "Ready";

/// Well-known Ready condition reasons
pub mod reasons {
    pub const RECONCILING: &str = "Reconciling";
    pub const DELETING: &str = "Deleting";
    pub const SUCCEEDED: &str = "Succeeded";
    pub const AZURE_RESOURCE_NOT_FOUND: &str = "AzureResourceNotFound";
    pub const ADDITIONAL_KUBERNETES_OBJ_WRITE_FAILURE: &str =
        "AdditionalKubernetesObjWriteFailure";
    pub const SUBSCRIPTION_MISMATCH: &str = "SubscriptionMismatch";
    pub const CREDENTIAL_INVALID: &str = "CredentialInvalid";
    pub const WAITING_FOR_OWNER: &str = "WaitingForOwner";
    pub const REFERENCE_NOT_FOUND: &str = "ReferenceNotFound";
    pub const POST_RECONCILIATION_CHECK_FAILED: &str = "PostReconciliationCheckFailed";
    pub const AZURE_NAME_NOT_SET: &str = "AzureNameNotSet";
    pub const FAILED: &str = "Failed";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

/// How bad a non-True condition is
///
/// `Error` will not resolve without a change to the resource, `Warning` is
/// expected to clear on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionSeverity {
    Error,
    Warning,
    Info,
    #[serde(rename = "")]
    None,
}

impl ConditionSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionSeverity::Error => "Error",
            ConditionSeverity::Warning => "Warning",
            ConditionSeverity::Info => "Info",
            ConditionSeverity::None => "",
        }
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,
    /// Severity of a non-True condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<ConditionSeverity>,
    /// Generation the condition was computed against
    #[serde(default)]
    pub observed_generation: i64,
    /// Last time the status changed (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn ready(
        status: ConditionStatus,
        severity: ConditionSeverity,
        reason: &str,
        message: impl Into<String>,
        generation: i64,
    ) -> Self {
        Self {
            r#type: READY_CONDITION_TYPE.to_string(),
            status,
            severity: Some(severity),
            observed_generation: generation,
            last_transition_time: None,
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        }
    }

    pub fn ready_succeeded(generation: i64) -> Self {
        Self::ready(
            ConditionStatus::True,
            ConditionSeverity::None,
            reasons::SUCCEEDED,
            "",
            generation,
        )
    }

    pub fn ready_reconciling(generation: i64) -> Self {
        Self::ready(
            ConditionStatus::Unknown,
            ConditionSeverity::Info,
            reasons::RECONCILING,
            "The resource is in the process of being reconciled by the operator",
            generation,
        )
    }

    pub fn ready_deleting(generation: i64) -> Self {
        Self::ready(
            ConditionStatus::False,
            ConditionSeverity::Info,
            reasons::DELETING,
            "The resource is being deleted",
            generation,
        )
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == type_)
}

/// Reason of the Ready condition, if any
pub fn ready_reason(conditions: &[Condition]) -> Option<&str> {
    find_condition(conditions, READY_CONDITION_TYPE).and_then(Condition::reason)
}

/// Insert or replace a condition of the same type
///
/// Keeps the previous transition time unless the status changed.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(existing) => {
            condition.last_transition_time = if existing.status == condition.status
                && existing.last_transition_time.is_some()
            {
                existing.last_transition_time.clone()
            } else {
                Some(chrono::Utc::now().to_rfc3339())
            };
            *existing = condition;
        }
        None => {
            condition.last_transition_time = Some(chrono::Utc::now().to_rfc3339());
            conditions.push(condition);
        }
    }
}

/// How quickly a Ready-impacting error should be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClassification {
    /// Standard backoff
    Fast,
    /// Long backoff for conditions a human must clear
    VerySlow,
    /// Do not retry until the resource changes
    None,
}

/// An error that dictates the Ready condition of the resource it occurred on
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}: {message}")]
pub struct ReadyConditionImpactingError {
    pub severity: ConditionSeverity,
    pub reason: String,
    pub message: String,
    pub retry: RetryClassification,
}

impl ReadyConditionImpactingError {
    pub fn new(
        severity: ConditionSeverity,
        reason: impl Into<String>,
        message: impl Into<String>,
        retry: RetryClassification,
    ) -> Self {
        Self {
            severity,
            reason: reason.into(),
            message: message.into(),
            retry,
        }
    }

    /// Error severity, never retried
    pub fn fatal(reason: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::new(
            ConditionSeverity::Error,
            reason,
            message.to_string(),
            RetryClassification::None,
        )
    }

    /// Warning severity, retried with the standard backoff
    pub fn warning(reason: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::new(
            ConditionSeverity::Warning,
            reason,
            message.to_string(),
            RetryClassification::Fast,
        )
    }

    /// Ready=False condition describing this error
    pub fn to_condition(&self, generation: i64) -> Condition {
        Condition::ready(
            ConditionStatus::False,
            self.severity,
            &self.reason,
            self.message.clone(),
            generation,
        )
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == ConditionSeverity::Error
    }
}
