//! ARM Resource Controller library
//!
//! Reconciles Kubernetes custom resources into Azure Resource Manager.
//!
//! - `arm` - ARM REST client, resource IDs, long-running operation pollers, error classification
//! - `conditions` - The Ready condition and ready-impacting errors
//! - `config` - Environment-driven controller configuration
//! - `controller` - Reconciler, events, backoff, HTTP server
//! - `crd` - Custom resource kinds
//! - `identity` - Credentials and the per-credential connection cache
//! - `observability` - Logging and Prometheus metrics
//! - `runtime` - Start-up and watch loops

pub mod arm;
pub mod conditions;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod identity;
pub mod observability;
pub mod prelude;
pub mod runtime;
