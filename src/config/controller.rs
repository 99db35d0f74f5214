//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Controller namespace
    /// Namespace where the controller is deployed (global credential lookup)
    pub controller_namespace: String,
    /// Azure Resource Manager endpoint
    pub arm_endpoint: String,
    /// Subscription used by the global credential when no secret is present
    pub azure_subscription_id: Option<String>,
    /// Tenant used by the global credential when no secret is present
    pub azure_tenant_id: Option<String>,
    /// Client ID used by the global credential (workload identity)
    pub azure_client_id: Option<String>,
    /// Name of the global credential secret in the controller namespace
    pub global_credential_secret_name: String,
    /// Periodic resync of reconciled resources (seconds, 0 disables)
    pub sync_period_secs: u64,
    /// Poll interval for in-flight operations without a Retry-After hint (seconds)
    pub poll_interval_secs: u64,
    /// Fibonacci backoff bounds for retryable errors (seconds)
    pub retry_backoff_min_secs: u64,
    pub retry_backoff_max_secs: u64,
    /// Fibonacci backoff bounds for the very slow tier (seconds)
    pub very_slow_backoff_min_secs: u64,
    pub very_slow_backoff_max_secs: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Exponential backoff for API server throttling on the watch (milliseconds)
    pub watch_backoff_start_ms: u64,
    pub watch_backoff_max_ms: u64,
    /// Maximum concurrent reconciliations per resource kind
    pub max_concurrent_reconciliations: u16,
    /// Timeout of a single ARM HTTP request (seconds)
    pub arm_http_timeout_secs: u64,
    /// HTTP server port for metrics and probes
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            arm_endpoint: DEFAULT_ARM_ENDPOINT.to_string(),
            azure_subscription_id: None,
            azure_tenant_id: None,
            azure_client_id: None,
            global_credential_secret_name: DEFAULT_GLOBAL_CREDENTIAL_SECRET_NAME.to_string(),
            sync_period_secs: DEFAULT_SYNC_PERIOD_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            retry_backoff_min_secs: DEFAULT_RETRY_BACKOFF_MIN_SECS,
            retry_backoff_max_secs: DEFAULT_RETRY_BACKOFF_MAX_SECS,
            very_slow_backoff_min_secs: DEFAULT_VERY_SLOW_BACKOFF_MIN_SECS,
            very_slow_backoff_max_secs: DEFAULT_VERY_SLOW_BACKOFF_MAX_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            watch_backoff_start_ms: DEFAULT_WATCH_BACKOFF_START_MS,
            watch_backoff_max_ms: DEFAULT_WATCH_BACKOFF_MAX_MS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            arm_http_timeout_secs: DEFAULT_ARM_HTTP_TIMEOUT_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            controller_namespace: string_or(&lookup, "POD_NAMESPACE", defaults.controller_namespace),
            arm_endpoint: string_or(&lookup, "AZURE_RESOURCE_MANAGER_ENDPOINT", defaults.arm_endpoint)
                .trim_end_matches('/')
                .to_string(),
            azure_subscription_id: non_empty(&lookup, "AZURE_SUBSCRIPTION_ID"),
            azure_tenant_id: non_empty(&lookup, "AZURE_TENANT_ID"),
            azure_client_id: non_empty(&lookup, "AZURE_CLIENT_ID"),
            global_credential_secret_name: string_or(
                &lookup,
                "GLOBAL_CREDENTIAL_SECRET_NAME",
                defaults.global_credential_secret_name,
            ),
            sync_period_secs: parsed_or(&lookup, "AZURE_SYNC_PERIOD_SECS", defaults.sync_period_secs),
            poll_interval_secs: parsed_or(&lookup, "POLL_INTERVAL_SECS", defaults.poll_interval_secs),
            retry_backoff_min_secs: parsed_or(
                &lookup,
                "RETRY_BACKOFF_MIN_SECS",
                defaults.retry_backoff_min_secs,
            ),
            retry_backoff_max_secs: parsed_or(
                &lookup,
                "RETRY_BACKOFF_MAX_SECS",
                defaults.retry_backoff_max_secs,
            ),
            very_slow_backoff_min_secs: parsed_or(
                &lookup,
                "VERY_SLOW_BACKOFF_MIN_SECS",
                defaults.very_slow_backoff_min_secs,
            ),
            very_slow_backoff_max_secs: parsed_or(
                &lookup,
                "VERY_SLOW_BACKOFF_MAX_SECS",
                defaults.very_slow_backoff_max_secs,
            ),
            watch_restart_delay_secs: parsed_or(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                defaults.watch_restart_delay_secs,
            ),
            watch_restart_delay_after_end_secs: parsed_or(
                &lookup,
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                defaults.watch_restart_delay_after_end_secs,
            ),
            watch_backoff_start_ms: parsed_or(
                &lookup,
                "WATCH_BACKOFF_START_MS",
                defaults.watch_backoff_start_ms,
            ),
            watch_backoff_max_ms: parsed_or(&lookup, "WATCH_BACKOFF_MAX_MS", defaults.watch_backoff_max_ms),
            max_concurrent_reconciliations: parsed_or(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
            arm_http_timeout_secs: parsed_or(
                &lookup,
                "ARM_HTTP_TIMEOUT_SECS",
                defaults.arm_http_timeout_secs,
            ),
            metrics_port: parsed_or(&lookup, "METRICS_PORT", defaults.metrics_port),
            log_level: string_or(&lookup, "LOG_LEVEL", defaults.log_level),
            log_format: string_or(&lookup, "LOG_FORMAT", defaults.log_format),
        }
    }

    /// Periodic resync after success, `None` when disabled
    pub fn sync_period(&self) -> Option<Duration> {
        (self.sync_period_secs > 0).then(|| Duration::from_secs(self.sync_period_secs))
    }

    /// Requeue delay for an in-flight operation without a server hint
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }

    /// Get ARM HTTP request timeout
    pub fn arm_http_timeout(&self) -> Duration {
        Duration::from_secs(self.arm_http_timeout_secs)
    }
}

/// Read a parsable value or return default
fn parsed_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a string or return default
fn string_or<F>(lookup: &F, key: &str, default: String) -> String
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).unwrap_or(default)
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}
