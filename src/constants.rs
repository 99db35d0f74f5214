//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Name used as field manager, event reporter and finalizer owner
pub const CONTROLLER_NAME: &str = "arm-resource-controller";

/// Prefix shared by every annotation and finalizer the controller owns
pub const ANNOTATION_PREFIX: &str = "serviceoperator.azure.com";

/// Finalizer guarding remote deletion of the ARM resource
pub const FINALIZER_NAME: &str = "serviceoperator.azure.com/finalizer";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default namespace the controller runs in (global credential lookup)
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "azureserviceoperator-system";

/// Default Azure Resource Manager endpoint
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

/// Name of the per-namespace credential secret
pub const NAMESPACE_CREDENTIAL_SECRET_NAME: &str = "aso-credential";

/// Default name of the global credential secret in the controller namespace
pub const DEFAULT_GLOBAL_CREDENTIAL_SECRET_NAME: &str = "aso-controller-settings";

/// Default periodic resync for successfully reconciled resources (seconds)
/// Picks up drift made outside the cluster
pub const DEFAULT_SYNC_PERIOD_SECS: u64 = 3600;

/// Default delay before polling an in-flight long-running operation (seconds)
/// Used when ARM does not send a Retry-After hint
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default Fibonacci backoff bounds for retryable errors (seconds)
pub const DEFAULT_RETRY_BACKOFF_MIN_SECS: u64 = 1;
pub const DEFAULT_RETRY_BACKOFF_MAX_SECS: u64 = 300;

/// Default Fibonacci backoff bounds for the "very slow" tier (seconds)
/// Used for errors a human has to resolve, such as management locks
pub const DEFAULT_VERY_SLOW_BACKOFF_MIN_SECS: u64 = 60;
pub const DEFAULT_VERY_SLOW_BACKOFF_MAX_SECS: u64 = 900;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Default exponential backoff for API server 429s on the watch stream (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_START_MS: u64 = 1000;
pub const DEFAULT_WATCH_BACKOFF_MAX_MS: u64 = 30_000;

/// Default maximum concurrent reconciliations per resource kind
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default timeout for a single ARM HTTP request (seconds)
pub const DEFAULT_ARM_HTTP_TIMEOUT_SECS: u64 = 60;
