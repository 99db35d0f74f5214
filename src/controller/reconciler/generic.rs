//! # Generic Controller
//!
//! The `kube_runtime::Controller` reconcile function shared by every kind.
//!
//! Each pass works on a clone of the cached object, hands it to the
//! [`ArmReconciler`], then persists what changed: a merge patch of the
//! metadata (annotations, finalizers, owner references, guarded by
//! `resourceVersion`) followed by a merge patch of the status.

use super::annotations::{ReconcilePolicy, reconcile_policy};
use super::arm_reconciler::{ArmReconciler, has_finalizer, remove_finalizer};
use super::types::{BackoffState, ReconcileResult, ReconcilerError};
use crate::conditions::{
    Condition, ConditionSeverity, ReadyConditionImpactingError, RetryClassification, reasons,
    set_condition,
};
use crate::config::ControllerConfig;
use crate::constants::CONTROLLER_NAME;
use crate::controller::events;
use crate::crd::ArmResource;
use crate::observability::metrics;
use kube::api::{Patch, PatchParams};
use kube::runtime::events::EventType;
use kube::{Api, Client, Resource};
use kube_runtime::controller::Action;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{Instrument, debug, info, warn};

/// Shared state handed to every reconcile of one kind
pub struct ControllerContext<K: ArmResource> {
    pub client: Client,
    pub reconciler: ArmReconciler<K>,
    pub config: ControllerConfig,
    /// Error backoff per `namespace/name`
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl<K: ArmResource> fmt::Debug for ControllerContext<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerContext")
            .field("reconciler", &self.reconciler)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K: ArmResource> ControllerContext<K> {
    pub fn new(client: Client, reconciler: ArmReconciler<K>, config: ControllerConfig) -> Self {
        Self {
            client,
            reconciler,
            config,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    pub fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(key);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    CreateOrUpdate,
    Delete,
    Detach,
    Claim,
    UpdateStatus,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::CreateOrUpdate => "create_or_update",
            Phase::Delete => "delete",
            Phase::Detach => "detach",
            Phase::Claim => "claim",
            Phase::UpdateStatus => "update_status",
        }
    }
}

/// `namespace/name`, the key for per-resource state
pub fn resource_key<K: Resource>(obj: &K) -> String {
    format!(
        "{}/{}",
        obj.meta().namespace.as_deref().unwrap_or("default"),
        obj.meta().name.as_deref().unwrap_or("unknown")
    )
}

/// Reconcile one object of kind `K`
///
/// # Errors
/// Errors that should be retried with backoff are returned to the error
/// policy. Fatal errors are written to the Ready condition and end the pass
/// with `Action::await_change()`.
pub async fn reconcile<K: ArmResource>(
    obj: Arc<K>,
    ctx: Arc<ControllerContext<K>>,
) -> Result<Action, ReconcilerError> {
    let span = tracing::info_span!(
        "arm.reconcile",
        kind = %K::kind(&()),
        namespace = obj.meta().namespace.as_deref().unwrap_or("default"),
        name = obj.meta().name.as_deref().unwrap_or("unknown"),
        action = tracing::field::Empty,
    );
    reconcile_object(obj, ctx).instrument(span).await
}

async fn reconcile_object<K: ArmResource>(
    obj: Arc<K>,
    ctx: Arc<ControllerContext<K>>,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    let kind = K::kind(&()).to_string();
    let key = resource_key(obj.as_ref());
    let original = obj.as_ref().clone();
    let mut working = original.clone();
    let policy = reconcile_policy(&working);

    let (phase, outcome) = if working.meta().deletion_timestamp.is_some() {
        if !has_finalizer(&working) {
            return Ok(Action::await_change());
        }
        let (phase, result) = if policy.allows_delete() {
            (Phase::Delete, ctx.reconciler.delete(&mut working).await)
        } else {
            info!(
                "🔗 Detaching {} from Azure (reconcile policy {})",
                key,
                policy.as_str()
            );
            ctx.reconciler
                .events()
                .publish(
                    &working.object_ref(&()),
                    EventType::Normal,
                    events::reasons::DETACHED,
                    events::actions::DELETE,
                    Some("Removed from Kubernetes, the Azure resource was left in place".to_string()),
                )
                .await;
            (Phase::Detach, Ok(ReconcileResult::done()))
        };
        if matches!(&result, Ok(r) if r.is_done()) {
            remove_finalizer(&mut working);
        }
        (phase, result)
    } else {
        let claimed = if has_finalizer(&working) {
            Ok(())
        } else {
            ctx.reconciler.claim(&mut working).await
        };
        match claimed {
            Err(err) => (Phase::Claim, Err(err)),
            Ok(()) if policy == ReconcilePolicy::Skip => {
                let result = ctx.reconciler.update_status(&mut working).await;
                if matches!(result, Ok(true)) {
                    let generation = working.meta().generation.unwrap_or_default();
                    set_condition(working.conditions_mut(), Condition::ready_succeeded(generation));
                }
                (Phase::UpdateStatus, result.map(|_| ReconcileResult::done()))
            }
            Ok(()) => (
                Phase::CreateOrUpdate,
                ctx.reconciler.create_or_update(&mut working).await,
            ),
        }
    };

    tracing::Span::current().record("action", phase.as_str());
    metrics::increment_reconciliations(&kind, phase.as_str());
    metrics::observe_reconciliation_duration(&kind, start.elapsed().as_secs_f64());

    match outcome {
        Ok(result) => {
            persist(&ctx.client, &original, &working).await?;
            ctx.reset_backoff(&key);
            Ok(action_for(result, &ctx.config, &kind))
        }
        Err(err) => {
            metrics::increment_reconciliation_errors(&kind, err.classification());
            if let Some(ready) = condition_for_error(&err) {
                let generation = working.meta().generation.unwrap_or_default();
                set_condition(working.conditions_mut(), ready.to_condition(generation));
            }
            ctx.reconciler
                .events()
                .publish(
                    &working.object_ref(&()),
                    EventType::Warning,
                    events::reasons::RECONCILE_FAILED,
                    phase.as_str(),
                    Some(err.to_string()),
                )
                .await;
            if let Err(e) = persist(&ctx.client, &original, &working).await {
                warn!("Failed to persist state of {} after error: {}", key, e);
            }

            let fatal = err
                .to_ready_error()
                .is_some_and(|ready| ready.retry == RetryClassification::None);
            if fatal {
                info!(
                    "⛔ {} failed with a fatal error, waiting for a spec change: {}",
                    key, err
                );
                return Ok(Action::await_change());
            }
            Err(err)
        }
    }
}

/// Ready condition to record for a failed pass
///
/// Errors without a condition of their own become Error/`Failed`.
/// `CurrentlyDeleting` leaves the `Deleting` condition alone.
pub fn condition_for_error(err: &ReconcilerError) -> Option<ReadyConditionImpactingError> {
    if matches!(err, ReconcilerError::CurrentlyDeleting) {
        return None;
    }
    Some(err.to_ready_error().unwrap_or_else(|| {
        ReadyConditionImpactingError::new(
            ConditionSeverity::Error,
            reasons::FAILED,
            err.to_string(),
            RetryClassification::Fast,
        )
    }))
}

/// Map a reconcile result to the controller's next action
pub fn action_for(result: ReconcileResult, config: &ControllerConfig, kind: &str) -> Action {
    if let Some(delay) = result.requeue_after {
        metrics::increment_requeues(kind, "retry_after");
        return Action::requeue(delay);
    }
    if result.requeue {
        metrics::increment_requeues(kind, "poll");
        return Action::requeue(config.poll_interval());
    }
    match config.sync_period() {
        Some(period) => {
            metrics::increment_requeues(kind, "resync");
            Action::requeue(period)
        }
        None => Action::await_change(),
    }
}

/// Merge patch for metadata changes, `None` when nothing changed
///
/// Removed annotations are sent as `null`. The original `resourceVersion`
/// makes the write fail if the object changed underneath us.
pub fn metadata_patch<K: Resource>(original: &K, updated: &K) -> Option<Value> {
    let before = original.meta();
    let after = updated.meta();
    let mut metadata = Map::new();

    let empty = Default::default();
    let old_annotations = before.annotations.as_ref().unwrap_or(&empty);
    let new_annotations = after.annotations.as_ref().unwrap_or(&empty);
    let mut annotations = Map::new();
    for (key, value) in new_annotations {
        if old_annotations.get(key) != Some(value) {
            annotations.insert(key.clone(), json!(value));
        }
    }
    for key in old_annotations.keys() {
        if !new_annotations.contains_key(key) {
            annotations.insert(key.clone(), Value::Null);
        }
    }
    if !annotations.is_empty() {
        metadata.insert("annotations".to_string(), Value::Object(annotations));
    }

    if before.finalizers != after.finalizers {
        metadata.insert(
            "finalizers".to_string(),
            json!(after.finalizers.clone().unwrap_or_default()),
        );
    }
    if before.owner_references != after.owner_references {
        metadata.insert(
            "ownerReferences".to_string(),
            json!(after.owner_references.clone().unwrap_or_default()),
        );
    }

    if metadata.is_empty() {
        return None;
    }
    if let Some(version) = &before.resource_version {
        metadata.insert("resourceVersion".to_string(), json!(version));
    }
    Some(json!({ "metadata": metadata }))
}

/// Merge patch for status changes, `None` when nothing changed
pub fn status_patch<K: ArmResource>(original: &K, updated: &K) -> Result<Option<Value>, ReconcilerError> {
    let before = serde_json::to_value(original)?;
    let after = serde_json::to_value(updated)?;
    let before = before.get("status").cloned().unwrap_or(Value::Null);
    let after = after.get("status").cloned().unwrap_or(Value::Null);
    if before == after || after.is_null() {
        return Ok(None);
    }
    Ok(Some(json!({ "status": after })))
}

async fn persist<K: ArmResource>(client: &Client, original: &K, updated: &K) -> Result<(), ReconcilerError> {
    let namespace = original.meta().namespace.as_deref().unwrap_or("default");
    let name = original.meta().name.as_deref().unwrap_or("unknown");
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let params = PatchParams::apply(CONTROLLER_NAME);

    if let Some(patch) = metadata_patch(original, updated) {
        api.patch(name, &params, &Patch::Merge(&patch)).await?;
        debug!(name, namespace, "Patched metadata");
    }

    // Once the finalizer is gone the object may already be deleted
    let finalized = updated.meta().deletion_timestamp.is_some() && !has_finalizer(updated);
    if finalized {
        return Ok(());
    }
    if let Some(patch) = status_patch(original, updated)? {
        api.patch_status(name, &params, &Patch::Merge(&patch)).await?;
        debug!(name, namespace, "Patched status");
    }
    Ok(())
}
