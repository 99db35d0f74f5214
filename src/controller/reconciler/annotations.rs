//! # Annotations
//!
//! Reconcile state persisted on the object itself, under the
//! `serviceoperator.azure.com/` prefix. Every helper here only touches the
//! in-memory object; persisting it is the caller's job.

use kube::Resource;
use std::collections::BTreeMap;
use tracing::warn;

pub const POLLER_RESUME_ID_ANNOTATION: &str = "serviceoperator.azure.com/poller-resume-id";
pub const POLLER_RESUME_TOKEN_ANNOTATION: &str = "serviceoperator.azure.com/poller-resume-token";
pub const LATEST_RECONCILED_GENERATION_ANNOTATION: &str =
    "serviceoperator.azure.com/latest-reconciled-generation";
pub const RESOURCE_ID_ANNOTATION: &str = "serviceoperator.azure.com/resource-id";
pub const CREDENTIAL_FROM_ANNOTATION: &str = "serviceoperator.azure.com/credential-from";
pub const RECONCILE_POLICY_ANNOTATION: &str = "serviceoperator.azure.com/reconcile-policy";

/// A persisted poller identifier and its resume token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeToken {
    pub poller_id: String,
    pub token: String,
}

fn annotation<'a, K: Resource>(obj: &'a K, key: &str) -> Option<&'a str> {
    obj.meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

fn set_annotation<K: Resource>(obj: &mut K, key: &str, value: impl Into<String>) {
    obj.meta_mut()
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.into());
}

fn remove_annotation<K: Resource>(obj: &mut K, key: &str) {
    if let Some(annotations) = obj.meta_mut().annotations.as_mut() {
        annotations.remove(key);
    }
}

/// Both resume annotations, or nothing
pub fn get_resume_token<K: Resource>(obj: &K) -> Option<ResumeToken> {
    let poller_id = annotation(obj, POLLER_RESUME_ID_ANNOTATION)?;
    let token = annotation(obj, POLLER_RESUME_TOKEN_ANNOTATION)?;
    Some(ResumeToken {
        poller_id: poller_id.to_string(),
        token: token.to_string(),
    })
}

pub fn set_resume_token<K: Resource>(obj: &mut K, poller_id: &str, token: &str) {
    set_annotation(obj, POLLER_RESUME_ID_ANNOTATION, poller_id);
    set_annotation(obj, POLLER_RESUME_TOKEN_ANNOTATION, token);
}

pub fn clear_resume_token<K: Resource>(obj: &mut K) {
    remove_annotation(obj, POLLER_RESUME_ID_ANNOTATION);
    remove_annotation(obj, POLLER_RESUME_TOKEN_ANNOTATION);
}

pub fn set_latest_reconciled_generation<K: Resource>(obj: &mut K) {
    let generation = obj.meta().generation.unwrap_or_default();
    set_annotation(
        obj,
        LATEST_RECONCILED_GENERATION_ANNOTATION,
        generation.to_string(),
    );
}

/// Unparsable values count as absent
pub fn get_latest_reconciled_generation<K: Resource>(obj: &K) -> Option<i64> {
    annotation(obj, LATEST_RECONCILED_GENERATION_ANNOTATION).and_then(|v| v.parse().ok())
}

pub fn get_resource_id<K: Resource>(obj: &K) -> Option<&str> {
    annotation(obj, RESOURCE_ID_ANNOTATION).filter(|id| !id.is_empty())
}

pub fn set_resource_id<K: Resource>(obj: &mut K, id: &str) {
    set_annotation(obj, RESOURCE_ID_ANNOTATION, id);
}

pub fn credential_from<K: Resource>(obj: &K) -> Option<&str> {
    annotation(obj, CREDENTIAL_FROM_ANNOTATION).filter(|name| !name.is_empty())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconcilePolicy {
    /// Create, update and delete the ARM resource
    #[default]
    Manage,
    /// Only refresh status; never write to ARM
    Skip,
    /// Manage, but leave the ARM resource behind on delete
    DetachOnDelete,
}

impl ReconcilePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manage" => Some(ReconcilePolicy::Manage),
            "skip" => Some(ReconcilePolicy::Skip),
            "detach-on-delete" => Some(ReconcilePolicy::DetachOnDelete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcilePolicy::Manage => "manage",
            ReconcilePolicy::Skip => "skip",
            ReconcilePolicy::DetachOnDelete => "detach-on-delete",
        }
    }

    pub fn allows_modify(&self) -> bool {
        *self != ReconcilePolicy::Skip
    }

    pub fn allows_delete(&self) -> bool {
        *self == ReconcilePolicy::Manage
    }
}

pub fn reconcile_policy<K: Resource>(obj: &K) -> ReconcilePolicy {
    match annotation(obj, RECONCILE_POLICY_ANNOTATION) {
        None => ReconcilePolicy::Manage,
        Some(value) => ReconcilePolicy::parse(value).unwrap_or_else(|| {
            warn!(
                policy = value,
                "Unknown reconcile policy, defaulting to manage"
            );
            ReconcilePolicy::Manage
        }),
    }
}
