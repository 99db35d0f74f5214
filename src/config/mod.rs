//! # Configuration
//!
//! Environment-driven configuration for the controller.

mod controller;

pub use controller::ControllerConfig;

use std::sync::Arc;

/// Configuration shared between the watch loops, error policy and server
pub type SharedControllerConfig = Arc<ControllerConfig>;
