//! # Reconciler
//!
//! Drives ARM resources towards the state declared on their Kubernetes
//! objects.
//!
//! ## Module Structure
//!
//! - `annotations.rs` - Resume token, generation, resource ID and policy annotations
//! - `actions.rs` - Which action a pass takes
//! - `instance.rs` - The per-pass state machine
//! - `arm_reconciler.rs` - `CreateOrUpdate` / `Delete` / `Claim` / `UpdateStatus`
//! - `generic.rs` - `kube_runtime` reconcile function and persistence
//! - `extensions.rs` - Kind-specific hooks
//! - `exporters.rs` - Secrets and ConfigMaps derived from a resource
//! - `resolver.rs` - Owner resolution and ARM payload conversion
//! - `types.rs` - Results, errors and backoff state
//!
//! ## Reconciliation Flow
//!
//! 1. Claim: finalizer, owner reference, initial Ready condition
//! 2. Pick an action from the resume token and the Ready condition
//! 3. Begin or monitor a create/update (or delete) in ARM
//! 4. On completion refresh status, run checks, export Secrets/ConfigMaps
//! 5. Persist annotations and status

pub mod actions;
pub mod annotations;
pub mod arm_reconciler;
pub mod exporters;
pub mod extensions;
pub mod generic;
pub mod instance;
pub mod resolver;
pub mod types;

pub use actions::{ReconcileAction, determine_create_or_update_action, determine_delete_action};
pub use annotations::{ReconcilePolicy, ResumeToken};
pub use arm_reconciler::ArmReconciler;
pub use exporters::{
    ExportError, ExportKind, ExportedObject, ExportedValue, KubeObjectApplier, ObjectApplier,
};
pub use extensions::{
    NoExtension, PostReconcileCheckResult, PreReconcileCheckResult, ResourceExtension,
    StorageAccountExtension,
};
pub use generic::{ControllerContext, reconcile};
pub use instance::ReconcilerInstance;
pub use resolver::{KubeReferenceResolver, ReferenceResolver, ResolvedOwner};
pub use types::{BackoffState, ReconcileResult, ReconcilerError};
