//! # Controller
//!
//! Core controller modules for the ARM resource controller.
//!
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `events`: Kubernetes Events for reconcile milestones
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod events;
pub mod reconciler;
pub mod server;
