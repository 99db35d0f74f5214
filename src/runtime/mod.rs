//! # Runtime
//!
//! Process wiring: start-up, the per-kind watch loops and their error
//! policy.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use initialization::{InitializationResult, initialize};
pub use watch_loop::{run_watch_loop, spawn_shutdown_handler};
