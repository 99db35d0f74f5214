//! # ARM Reconciler
//!
//! Entry points the controller calls once per reconcile pass: resolve the
//! connection for the object, bind a [`ReconcilerInstance`] to it and
//! delegate.

use super::extensions::ResourceExtension;
use super::exporters::ObjectApplier;
use super::instance::ReconcilerInstance;
use super::resolver::ReferenceResolver;
use super::types::{ReconcileResult, ReconcilerError};
use crate::conditions::{Condition, READY_CONDITION_TYPE, find_condition, set_condition};
use crate::constants::FINALIZER_NAME;
use crate::controller::events::EventPublisher;
use crate::crd::ArmResource;
use crate::identity::ConnectionCache;
use kube::Resource;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub struct ArmReconciler<K: ArmResource> {
    connections: Arc<ConnectionCache>,
    extension: Arc<dyn ResourceExtension<K>>,
    resolver: Arc<dyn ReferenceResolver>,
    applier: Arc<dyn ObjectApplier>,
    events: Arc<dyn EventPublisher>,
}

impl<K: ArmResource> fmt::Debug for ArmReconciler<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArmReconciler")
            .field("kind", &K::kind(&()))
            .field("extension", &self.extension)
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}

impl<K: ArmResource> ArmReconciler<K> {
    pub fn new(
        connections: Arc<ConnectionCache>,
        extension: Arc<dyn ResourceExtension<K>>,
        resolver: Arc<dyn ReferenceResolver>,
        applier: Arc<dyn ObjectApplier>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            connections,
            extension,
            resolver,
            applier,
            events,
        }
    }

    pub fn events(&self) -> &dyn EventPublisher {
        self.events.as_ref()
    }

    /// # Errors
    /// Connection errors, or whatever the selected action fails with
    pub async fn create_or_update(&self, obj: &mut K) -> Result<ReconcileResult, ReconcilerError> {
        let connection = self.connections.get_connection(&*obj).await?;
        let mut instance = ReconcilerInstance::new(
            obj,
            &connection,
            self.extension.as_ref(),
            self.resolver.as_ref(),
            self.applier.as_ref(),
            self.events.as_ref(),
        );
        instance.create_or_update().await
    }

    pub async fn delete(&self, obj: &mut K) -> Result<ReconcileResult, ReconcilerError> {
        let connection = self.connections.get_connection(&*obj).await?;
        let mut instance = ReconcilerInstance::new(
            obj,
            &connection,
            self.extension.as_ref(),
            self.resolver.as_ref(),
            self.applier.as_ref(),
            self.events.as_ref(),
        );
        instance.delete().await
    }

    /// Status-only refresh; `false` when there was nothing to refresh yet
    pub async fn update_status(&self, obj: &mut K) -> Result<bool, ReconcilerError> {
        let connection = self.connections.get_connection(&*obj).await?;
        let mut instance = ReconcilerInstance::new(
            obj,
            &connection,
            self.extension.as_ref(),
            self.resolver.as_ref(),
            self.applier.as_ref(),
            self.events.as_ref(),
        );
        instance.update_status().await
    }

    /// One-time setup before the first reconcile
    ///
    /// Adds the finalizer, an owner reference to the owning `ResourceGroup`,
    /// runs the kind's claimer and initialises an absent Ready condition.
    pub async fn claim(&self, obj: &mut K) -> Result<(), ReconcilerError> {
        if let Some(owner) = obj.owner().map(str::to_string) {
            let namespace = obj.meta().namespace.clone().unwrap_or_default();
            let resolved = self.resolver.resolve_owner(&namespace, &owner).await?;
            let references = obj.meta_mut().owner_references.get_or_insert_with(Vec::new);
            if !references
                .iter()
                .any(|r| r.uid == resolved.owner_reference.uid)
            {
                references.push(resolved.owner_reference);
            }
        }

        let finalizers = obj.meta_mut().finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == FINALIZER_NAME) {
            finalizers.push(FINALIZER_NAME.to_string());
        }

        if let Some(claimer) = self.extension.claimer() {
            claimer.claim(obj).await?;
        }

        if find_condition(obj.conditions(), READY_CONDITION_TYPE).is_none() {
            let generation = obj.meta().generation.unwrap_or_default();
            set_condition(obj.conditions_mut(), Condition::ready_reconciling(generation));
        }
        debug!(
            name = obj.meta().name.as_deref().unwrap_or("unknown"),
            "Claimed resource"
        );
        Ok(())
    }
}

/// Whether the controller's finalizer is present
pub fn has_finalizer<K: Resource>(obj: &K) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|f| f == FINALIZER_NAME))
}

pub fn remove_finalizer<K: Resource>(obj: &mut K) {
    if let Some(finalizers) = obj.meta_mut().finalizers.as_mut() {
        finalizers.retain(|f| f != FINALIZER_NAME);
    }
}
