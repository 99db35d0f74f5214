//! # Logging
//!
//! `tracing-subscriber` setup. `RUST_LOG` wins when set; otherwise the
//! configured log level applies to this crate only.

use crate::config::ControllerConfig;
use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

fn default_directive(config: &ControllerConfig) -> String {
    format!(
        "arm_resource_controller={}",
        config.log_level.to_ascii_lowercase()
    )
}

/// Install the global subscriber
///
/// # Errors
/// Returns an error if a global subscriber is already installed
pub fn init_logging(config: &ControllerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.log_format.eq_ignore_ascii_case("json") {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow!("Failed to initialize tracing subscriber: {e}"))
}
