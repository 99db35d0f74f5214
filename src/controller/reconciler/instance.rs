//! # Reconciler Instance
//!
//! One reconcile pass for one object. The instance borrows the object, the
//! connection and the collaborators for the duration of the pass, decides a
//! single [`ReconcileAction`] from the persisted resume token and the Ready
//! condition, executes it and reports back through [`ReconcileResult`].
//!
//! Long-running ARM operations are never awaited here. A create or delete
//! that does not finish synchronously leaves a resume token on the object and
//! the next pass picks it up.
//!
//! ```text
//! CreateOrUpdate                        Delete
//!   Ready=Deleting   -> error             delete token -> MonitorDelete
//!   resume token     -> MonitorResource   otherwise    -> StartDeleteOfResource
//!   otherwise        -> BeginCreateOrUpdate
//! ```
//!
//! The instance only mutates the in-memory object. Persisting annotations
//! and status is left to the caller.

use super::actions::{ReconcileAction, determine_create_or_update_action, determine_delete_action};
use super::annotations::{
    clear_resume_token, get_latest_reconciled_generation, get_resource_id, get_resume_token,
    set_latest_reconciled_generation, set_resource_id, set_resume_token,
};
use super::extensions::{
    PostReconcileCheckResult, PreReconcileCheckResult, ResourceExtension, wrap_extension_error,
};
use super::exporters::{ExportError, ObjectApplier, merge_exports, operator_spec_exports};
use super::resolver::{ReferenceResolver, convert_to_arm};
use super::types::{ReconcileResult, ReconcilerError};
use crate::arm::{
    ArmId, CREATE_POLLER_ID, CloudError, DELETE_POLLER_ID, Poller, PollerKind, classify_cloud_error,
};
use crate::conditions::{Condition, ReadyConditionImpactingError, ready_reason, reasons, set_condition};
use crate::controller::events::{self, EventPublisher};
use crate::crd::ArmResource;
use crate::identity::Connection;
use kube::Resource;
use kube::runtime::events::EventType;
use tracing::{debug, info, warn};

/// How a status refresh treats a resource that is not there
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshMode {
    /// Right after a create/update; the poller said it exists
    Manage,
    /// Status-only refresh
    Watch,
}

#[derive(Debug)]
pub struct ReconcilerInstance<'a, K: ArmResource> {
    obj: &'a mut K,
    connection: &'a Connection,
    extension: &'a dyn ResourceExtension<K>,
    resolver: &'a dyn ReferenceResolver,
    applier: &'a dyn ObjectApplier,
    events: &'a dyn EventPublisher,
}

impl<'a, K: ArmResource> ReconcilerInstance<'a, K> {
    pub fn new(
        obj: &'a mut K,
        connection: &'a Connection,
        extension: &'a dyn ResourceExtension<K>,
        resolver: &'a dyn ReferenceResolver,
        applier: &'a dyn ObjectApplier,
        events: &'a dyn EventPublisher,
    ) -> Self {
        Self {
            obj,
            connection,
            extension,
            resolver,
            applier,
            events,
        }
    }

    /// # Errors
    /// `CurrentlyDeleting` while a delete is in flight, otherwise whatever
    /// the selected action fails with
    pub async fn create_or_update(&mut self) -> Result<ReconcileResult, ReconcilerError> {
        let resume = get_resume_token(&*self.obj);
        let action =
            determine_create_or_update_action(resume.as_ref(), ready_reason(self.obj.conditions()))?;
        self.run(action).await
    }

    pub async fn delete(&mut self) -> Result<ReconcileResult, ReconcilerError> {
        let resume = get_resume_token(&*self.obj);
        let action = determine_delete_action(resume.as_ref());
        self.run(action).await
    }

    /// Status-only refresh; never writes to ARM
    ///
    /// Does nothing until the resource has a recorded ID. Returns whether
    /// the status was actually refreshed.
    pub async fn update_status(&mut self) -> Result<bool, ReconcilerError> {
        let Some(id) = get_resource_id(&*self.obj) else {
            debug!(name = %self.name(), "No resource ID recorded, skipping status refresh");
            return Ok(false);
        };
        let id = ArmId::parse(id)?;
        self.refresh_status(&id, RefreshMode::Watch).await?;
        Ok(true)
    }

    async fn run(&mut self, action: ReconcileAction) -> Result<ReconcileResult, ReconcilerError> {
        debug!(name = %self.name(), action = %action, "Executing reconcile action");
        match action {
            ReconcileAction::BeginCreateOrUpdateResource => self.begin_create_or_update().await,
            ReconcileAction::MonitorResourceCreation => self.monitor_resource_creation().await,
            ReconcileAction::StartDeleteOfResource => self.start_delete_of_resource().await,
            ReconcileAction::MonitorDelete => self.monitor_delete().await,
        }
    }

    async fn begin_create_or_update(&mut self) -> Result<ReconcileResult, ReconcilerError> {
        if self.obj.azure_name().is_empty() {
            return Err(ReadyConditionImpactingError::fatal(
                reasons::AZURE_NAME_NOT_SET,
                "AzureName was not set. A webhook should default this to .metadata.name",
            )
            .into());
        }

        set_latest_reconciled_generation(&mut *self.obj);

        if let Some(checker) = self.extension.pre_reconciliation_checker() {
            let check = checker
                .pre_reconcile_check(&*self.obj, self.connection)
                .await
                .map_err(|e| wrap_extension_error(e, reasons::FAILED))?;
            match check {
                PreReconcileCheckResult::Proceed => {}
                PreReconcileCheckResult::Postpone => {
                    info!("⏸️  Pre-reconciliation check postponed {}", self.name());
                    return Ok(ReconcileResult::done());
                }
                PreReconcileCheckResult::Block(err) => {
                    info!("🚫 Pre-reconciliation check blocked {}: {}", self.name(), err);
                    return Err(err.into());
                }
            }
        }

        self.check_subscription()?;

        let (id, body) = convert_to_arm(&*self.obj, self.resolver, self.connection).await?;
        set_resource_id(&mut *self.obj, id.as_str());
        let body = match self.extension.arm_resource_modifier() {
            Some(modifier) => modifier
                .modify_arm_resource(&*self.obj, self.connection, body)
                .await
                .map_err(|e| wrap_extension_error(e, reasons::FAILED))?,
            None => body,
        };

        let generation = self.generation();
        set_condition(self.obj.conditions_mut(), Condition::ready_reconciling(generation));
        info!("🚀 Starting create/update of {} ({})", self.name(), id);
        self.publish(
            EventType::Normal,
            events::reasons::CREATE_OR_UPDATE_STARTED,
            events::actions::CREATE_OR_UPDATE,
            format!("Sending PUT to {id}"),
        )
        .await;

        let poller = match self
            .connection
            .client()
            .begin_create_or_update_by_id(&id, K::API_VERSION, &body)
            .await
        {
            Ok(poller) => poller,
            Err(e) => return Err(self.cloud_failure("create/update", &e)),
        };

        if poller.done() {
            debug!(name = %self.name(), "Create/update completed synchronously");
            return self.handle_create_or_update_success().await;
        }

        set_resume_token(&mut *self.obj, poller.id(), &poller.resume_token());
        info!("⏳ Create/update of {} is in progress", self.name());
        Ok(ReconcileResult::requeue())
    }

    async fn monitor_resource_creation(&mut self) -> Result<ReconcileResult, ReconcilerError> {
        let action = "monitor resource creation";
        let mut poller = self.resume_poller(action, PollerKind::CreateOrUpdate)?;

        match self.connection.client().poll(&mut poller).await {
            Err(e) => {
                let err = self.cloud_failure("create/update", &e);
                if !self.generation_changed() {
                    return Err(err);
                }
                Ok(self.requeue_stale_generation(Some(&err)).await)
            }
            Ok(()) if poller.done() => {
                let settled = self.handle_create_or_update_success().await;
                if !self.generation_changed() {
                    return settled;
                }
                Ok(self.requeue_stale_generation(settled.as_ref().err()).await)
            }
            Ok(()) => {
                set_resume_token(&mut *self.obj, poller.id(), &poller.resume_token());
                debug!(
                    name = %self.name(),
                    retry_after = ?poller.retry_after(),
                    "Create/update still in progress"
                );
                Ok(requeue_for(&poller))
            }
        }
    }

    async fn start_delete_of_resource(&mut self) -> Result<ReconcileResult, ReconcilerError> {
        let Some(id) = get_resource_id(&*self.obj) else {
            info!(
                "🗑️  {} was never created in Azure, nothing to delete",
                self.name()
            );
            return Ok(ReconcileResult::done());
        };
        let id = ArmId::parse(id)?;
        self.check_subscription()?;

        let started = match self.extension.deleter() {
            Some(deleter) => deleter.delete(&*self.obj, &id, self.connection).await,
            None => {
                self.connection
                    .client()
                    .begin_delete_by_id(&id, K::API_VERSION)
                    .await
            }
        };

        match started {
            Err(e) if e.is_not_found() => {
                clear_resume_token(&mut *self.obj);
                info!("🗑️  {} is already gone from Azure", self.name());
                self.publish_deleted().await;
                Ok(ReconcileResult::done())
            }
            Err(e) => Err(self.cloud_failure("delete", &e)),
            Ok(poller) if poller.done() => {
                clear_resume_token(&mut *self.obj);
                self.publish_deleted().await;
                Ok(ReconcileResult::done())
            }
            Ok(poller) => {
                set_resume_token(&mut *self.obj, poller.id(), &poller.resume_token());
                let generation = self.generation();
                set_condition(self.obj.conditions_mut(), Condition::ready_deleting(generation));
                info!("🗑️  Started delete of {} ({})", self.name(), id);
                self.publish(
                    EventType::Normal,
                    events::reasons::DELETE_STARTED,
                    events::actions::DELETE,
                    format!("Sending DELETE to {id}"),
                )
                .await;
                Ok(ReconcileResult::requeue())
            }
        }
    }

    async fn monitor_delete(&mut self) -> Result<ReconcileResult, ReconcilerError> {
        let mut poller = self.resume_poller("monitor delete", PollerKind::Delete)?;

        match self.connection.client().poll(&mut poller).await {
            Err(e) if e.is_not_found() => {
                clear_resume_token(&mut *self.obj);
                self.publish_deleted().await;
                Ok(ReconcileResult::done())
            }
            Err(e) => Err(self.cloud_failure("delete", &e)),
            Ok(()) if poller.done() => {
                clear_resume_token(&mut *self.obj);
                info!("✅ Delete of {} completed", self.name());
                self.publish_deleted().await;
                Ok(ReconcileResult::done())
            }
            Ok(()) => {
                set_resume_token(&mut *self.obj, poller.id(), &poller.resume_token());
                debug!(
                    name = %self.name(),
                    retry_after = ?poller.retry_after(),
                    "Delete still in progress"
                );
                Ok(requeue_for(&poller))
            }
        }
    }

    /// Shared by synchronous and polled create/update completion
    ///
    /// Any failure clears the resume token so the next pass starts over.
    async fn handle_create_or_update_success(&mut self) -> Result<ReconcileResult, ReconcilerError> {
        if let Err(err) = self.settle_create_or_update().await {
            clear_resume_token(&mut *self.obj);
            return Err(err);
        }

        clear_resume_token(&mut *self.obj);
        let generation = self.generation();
        set_condition(self.obj.conditions_mut(), Condition::ready_succeeded(generation));
        info!("✅ {} is up to date in Azure", self.name());
        self.publish(
            EventType::Normal,
            events::reasons::CREATE_OR_UPDATE_SUCCEEDED,
            events::actions::CREATE_OR_UPDATE,
            "Resource successfully created or updated".to_string(),
        )
        .await;
        Ok(ReconcileResult::done())
    }

    async fn settle_create_or_update(&mut self) -> Result<(), ReconcilerError> {
        let id = get_resource_id(&*self.obj)
            .ok_or_else(|| ReconcilerError::UnresolvedResourceId(self.name()))?;
        let id = ArmId::parse(id)?;
        self.refresh_status(&id, RefreshMode::Manage).await?;

        if let Some(checker) = self.extension.post_reconciliation_checker() {
            let check = checker
                .post_reconcile_check(&*self.obj, self.connection)
                .await
                .map_err(|e| wrap_extension_error(e, reasons::POST_RECONCILIATION_CHECK_FAILED))?;
            if let PostReconcileCheckResult::Failure(err) = check {
                return Err(err.into());
            }
        }

        self.export_kubernetes_resources().await?;

        if let Some(handler) = self.extension.success_handler() {
            handler
                .on_success(&mut *self.obj, self.connection)
                .await
                .map_err(|e| wrap_extension_error(e, reasons::FAILED))?;
        }
        Ok(())
    }

    async fn refresh_status(&mut self, id: &ArmId, mode: RefreshMode) -> Result<(), ReconcilerError> {
        let client = self.connection.client();
        let refreshed = if self.obj.supports_get() {
            client.get_by_id(id, K::API_VERSION).await
        } else {
            match client.check_existence_by_id(id, K::API_VERSION).await {
                Ok(true) => Ok(serde_json::json!({ "id": id.as_str() })),
                Ok(false) => Err(CloudError::new(
                    Some(404),
                    "ResourceNotFound",
                    format!("{id} does not exist"),
                )),
                Err(e) => Err(e),
            }
        };

        match refreshed {
            Ok(body) => {
                self.obj.set_arm_status(&body);
                Ok(())
            }
            Err(e) if e.is_not_found() && mode == RefreshMode::Watch => {
                warn!(name = %self.name(), id = %id, "Resource not found in Azure");
                Err(ReadyConditionImpactingError::warning(
                    reasons::AZURE_RESOURCE_NOT_FOUND,
                    format!("{id} was not found in Azure: {e}"),
                )
                .into())
            }
            Err(e) if e.is_not_found() => {
                // The operation reported success but the resource is missing
                warn!(
                    name = %self.name(),
                    id = %id,
                    "Resource not found right after a successful create/update"
                );
                Err(self.cloud_failure("refresh status", &e))
            }
            Err(e) => Err(ReconcilerError::from_cloud(&e)),
        }
    }

    async fn export_kubernetes_resources(&mut self) -> Result<(), ReconcilerError> {
        let mut values =
            operator_spec_exports(&*self.obj).map_err(|e| export_failure(&e))?;
        if let Some(exporter) = self.extension.kubernetes_exporter() {
            let exported = exporter
                .export_kubernetes_resources(&*self.obj, self.connection)
                .await
                .map_err(exporter_failure)?;
            values.extend(exported);
        }
        if let Some(exporter) = self.extension.secret_exporter() {
            let exported = exporter
                .export_secrets(&*self.obj, self.connection)
                .await
                .map_err(exporter_failure)?;
            values.extend(exported);
        }
        if values.is_empty() {
            return Ok(());
        }

        let objects = merge_exports(values).map_err(|e| export_failure(&e))?;
        let owner = self
            .obj
            .controller_owner_ref(&())
            .ok_or_else(|| export_failure(&ExportError::MissingOwner))?;
        let namespace = self.obj.meta().namespace.clone().unwrap_or_default();
        self.applier
            .apply(&namespace, &owner, &objects)
            .await
            .map_err(|e| export_failure(&e))?;
        debug!(name = %self.name(), objects = objects.len(), "Exported Kubernetes resources");
        Ok(())
    }

    fn resume_poller(&self, action: &'static str, kind: PollerKind) -> Result<Poller, ReconcilerError> {
        let resume =
            get_resume_token(&*self.obj).ok_or(ReconcilerError::MissingResumeToken { action })?;
        let expected = match kind {
            PollerKind::CreateOrUpdate => CREATE_POLLER_ID,
            PollerKind::Delete => DELETE_POLLER_ID,
        };
        if resume.poller_id != expected {
            return Err(ReconcilerError::UnexpectedPoller {
                action,
                expected,
                actual: resume.poller_id,
            });
        }
        Poller::resume(kind, &resume.token)
            .map_err(|source| ReconcilerError::Poller { action, source })
    }

    /// A recorded resource ID must belong to the connection's subscription
    fn check_subscription(&self) -> Result<(), ReconcilerError> {
        let Some(recorded) = get_resource_id(&*self.obj) else {
            return Ok(());
        };
        let recorded = ArmId::parse(recorded)?;
        let active = self.connection.subscription_id();
        if recorded.subscription_id().eq_ignore_ascii_case(active) {
            return Ok(());
        }
        Err(ReadyConditionImpactingError::fatal(
            reasons::SUBSCRIPTION_MISMATCH,
            format!(
                "resource {} belongs to subscription {} but the credential {} is for subscription {}",
                recorded,
                recorded.subscription_id(),
                self.connection.credential_from(),
                active
            ),
        )
        .into())
    }

    /// Classify a failed ARM call and drop the resume token
    fn cloud_failure(&mut self, operation: &str, err: &CloudError) -> ReconcilerError {
        clear_resume_token(&mut *self.obj);
        let details = classify_cloud_error(Some(err));
        warn!(
            name = %self.name(),
            operation,
            classification = details.classification.as_str(),
            code = %details.code,
            "❌ ARM {} failed: {}",
            operation,
            err
        );
        ReconcilerError::ReadyCondition(details.into_ready_error())
    }

    /// Spec changed while an operation was in flight
    fn generation_changed(&self) -> bool {
        get_latest_reconciled_generation(&*self.obj)
            .is_some_and(|latest| latest != self.generation())
    }

    /// The finished operation was for an older generation; record how it ended
    /// and go again with the new one
    async fn requeue_stale_generation(&mut self, err: Option<&ReconcilerError>) -> ReconcileResult {
        if let Some(ready) = err.and_then(ReconcilerError::to_ready_error) {
            let generation = self.generation();
            set_condition(self.obj.conditions_mut(), ready.to_condition(generation));
        }
        self.requeue_for_generation_change().await;
        ReconcileResult::requeue()
    }

    async fn requeue_for_generation_change(&self) {
        info!(
            "🔁 {} changed while an operation was in flight, requeueing",
            self.name()
        );
        self.publish(
            EventType::Normal,
            events::reasons::GENERATION_CHANGED,
            events::actions::CREATE_OR_UPDATE,
            "Spec changed while an operation was in progress".to_string(),
        )
        .await;
    }

    async fn publish_deleted(&self) {
        self.publish(
            EventType::Normal,
            events::reasons::DELETE_SUCCEEDED,
            events::actions::DELETE,
            "Resource deleted from Azure".to_string(),
        )
        .await;
    }

    async fn publish(&self, type_: EventType, reason: &str, action: &str, note: String) {
        let reference = self.obj.object_ref(&());
        self.events
            .publish(&reference, type_, reason, action, Some(note))
            .await;
    }

    fn generation(&self) -> i64 {
        self.obj.meta().generation.unwrap_or_default()
    }

    fn name(&self) -> String {
        format!(
            "{}/{}",
            self.obj.meta().namespace.as_deref().unwrap_or("default"),
            self.obj.meta().name.as_deref().unwrap_or("unknown")
        )
    }
}

/// Honor the server's Retry-After when it gave one
fn requeue_for(poller: &Poller) -> ReconcileResult {
    poller
        .retry_after()
        .map_or_else(ReconcileResult::requeue, ReconcileResult::requeue_after)
}

fn export_failure(err: &ExportError) -> ReconcilerError {
    ReconcilerError::ReadyCondition(err.to_ready_error())
}

/// Exporter hooks keep their own condition; anything else is a write failure
fn exporter_failure(err: ReconcilerError) -> ReconcilerError {
    match err {
        ReconcilerError::ReadyCondition(_) => err,
        other => ReconcilerError::ReadyCondition(ReadyConditionImpactingError::fatal(
            reasons::ADDITIONAL_KUBERNETES_OBJ_WRITE_FAILURE,
            other,
        )),
    }
}
