//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `arm_controller_reconciliations_total{kind,action}` - Reconciliations by kind and action
//! - `arm_controller_reconciliation_errors_total{kind,classification}` - Failed reconciliations
//! - `arm_controller_reconciliation_duration_seconds{kind}` - Duration of reconcile passes
//! - `arm_controller_requeues_total{kind,trigger}` - Requeues by trigger
//! - `arm_controller_arm_requests_total{method,status}` - ARM REST calls
//! - `arm_controller_arm_request_duration_seconds{method}` - Duration of ARM REST calls
//! - `arm_controller_connections_built_total` - ARM clients built by the connection cache
//! - `arm_controller_exported_objects_total{kind}` - Secrets/ConfigMaps applied by exporters

use anyhow::Result;
use prometheus::{HistogramVec, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;
use std::time::Duration;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "arm_controller_reconciliations_total",
            "Total number of reconciliations by resource kind and action",
        ),
        &["kind", "action"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "arm_controller_reconciliation_errors_total",
            "Total number of reconciliation errors by resource kind and classification",
        ),
        &["kind", "classification"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "arm_controller_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "arm_controller_requeues_total",
            "Total number of requeues by resource kind and trigger",
        ),
        &["kind", "trigger"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static ARM_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "arm_controller_arm_requests_total",
            "Total number of Azure Resource Manager requests by method and status",
        ),
        &["method", "status"],
    )
    .expect("Failed to create ARM_REQUESTS_TOTAL metric - this should never happen")
});

static ARM_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "arm_controller_arm_request_duration_seconds",
            "Duration of Azure Resource Manager requests in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method"],
    )
    .expect("Failed to create ARM_REQUEST_DURATION metric - this should never happen")
});

static CONNECTIONS_BUILT_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "arm_controller_connections_built_total",
        "Total number of ARM clients built by the connection cache",
    )
    .expect("Failed to create CONNECTIONS_BUILT_TOTAL metric - this should never happen")
});

static EXPORTED_OBJECTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "arm_controller_exported_objects_total",
            "Total number of Secrets and ConfigMaps applied by exporters",
        ),
        &["kind"],
    )
    .expect("Failed to create EXPORTED_OBJECTS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ARM_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ARM_REQUEST_DURATION.clone()))?;
    REGISTRY.register(Box::new(CONNECTIONS_BUILT_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EXPORTED_OBJECTS_TOTAL.clone()))?;

    Ok(())
}

pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}

pub fn increment_reconciliations(kind: &str, action: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind, action]).inc();
}

pub fn increment_reconciliation_errors(kind: &str, classification: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[kind, classification])
        .inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn increment_requeues(kind: &str, trigger: &str) {
    REQUEUES_TOTAL.with_label_values(&[kind, trigger]).inc();
}

pub fn record_arm_request(method: &str, status: &str, duration: Duration) {
    ARM_REQUESTS_TOTAL
        .with_label_values(&[method, status])
        .inc();
    ARM_REQUEST_DURATION
        .with_label_values(&[method])
        .observe(duration.as_secs_f64());
}

pub fn increment_connections_built() {
    CONNECTIONS_BUILT_TOTAL.inc();
}

pub fn increment_exported_objects(kind: &str) {
    EXPORTED_OBJECTS_TOTAL.with_label_values(&[kind]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labelled_counters_accumulate() {
        let before = RECONCILIATIONS_TOTAL
            .with_label_values(&["ResourceGroup", "test"])
            .get();
        increment_reconciliations("ResourceGroup", "test");
        increment_reconciliations("ResourceGroup", "test");
        let after = RECONCILIATIONS_TOTAL
            .with_label_values(&["ResourceGroup", "test"])
            .get();
        assert_eq!(after - before, 2);
    }

    #[test]
    fn test_arm_request_records_count_and_duration() {
        let before = ARM_REQUESTS_TOTAL.with_label_values(&["PATCH", "418"]).get();
        record_arm_request("PATCH", "418", Duration::from_millis(20));
        assert_eq!(
            ARM_REQUESTS_TOTAL.with_label_values(&["PATCH", "418"]).get() - before,
            1
        );
        assert!(
            ARM_REQUEST_DURATION
                .with_label_values(&["PATCH"])
                .get_sample_count()
                >= 1
        );
    }
}
