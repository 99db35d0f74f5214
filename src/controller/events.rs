//! # Events
//!
//! Kubernetes Events for reconcile milestones, visible through
//! `kubectl describe`. Publishing is fire-and-forget: a failed event is
//! logged and never fails the reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use std::fmt;
use tracing::warn;

#[async_trait]
pub trait EventPublisher: Send + Sync + fmt::Debug {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

#[derive(Debug, Default)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons (REASON column)
pub mod reasons {
    pub const CREATE_OR_UPDATE_STARTED: &str = "BeginCreateOrUpdate";
    pub const CREATE_OR_UPDATE_SUCCEEDED: &str = "CreateOrUpdateSucceeded";
    pub const DELETE_STARTED: &str = "BeginDelete";
    pub const DELETE_SUCCEEDED: &str = "DeleteSucceeded";
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
    pub const GENERATION_CHANGED: &str = "GenerationChanged";
    pub const RESOURCE_NOT_FOUND: &str = "AzureResourceNotFound";
    pub const DETACHED: &str = "Detached";
}

/// Event actions (ACTION column)
pub mod actions {
    pub const CREATE_OR_UPDATE: &str = "CreateOrUpdate";
    pub const DELETE: &str = "Delete";
    pub const UPDATE_STATUS: &str = "UpdateStatus";
}
