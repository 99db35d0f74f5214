//! # Prelude
//!
//! ```rust
//! use arm_resource_controller::prelude::*;
//! ```

pub use crate::crd::*;

pub use crate::arm::{ArmClient, ArmId, CloudError, Poller};

pub use crate::conditions::{
    Condition, ConditionSeverity, ReadyConditionImpactingError, RetryClassification,
};

pub use crate::controller::reconciler::{
    ArmReconciler, BackoffState, ControllerContext, ReconcileResult, ReconcilerError,
    ResourceExtension, reconcile,
};

pub use crate::config::{ControllerConfig, SharedControllerConfig};

pub use crate::identity::{Connection, ConnectionCache, ConnectionError};
