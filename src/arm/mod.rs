//! # Azure Resource Manager
//!
//! - `client`: the `ArmClient` trait and its REST implementation
//! - `errors`: cloud errors and their retry classification
//! - `poller`: resumable long-running operation handles
//! - `resource_id`: fully-qualified ARM resource IDs

pub mod client;
pub mod errors;
pub mod poller;
pub mod resource_id;

pub use client::{ArmClient, GenericClient};
pub use errors::{
    Classification, CloudError, CloudErrorDetails, RetryHint, classify_cloud_error,
};
pub use poller::{CREATE_POLLER_ID, DELETE_POLLER_ID, Poller, PollerError, PollerKind};
pub use resource_id::{ArmId, ArmIdError};
