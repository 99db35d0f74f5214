//! # Types
//!
//! Results and errors shared by the reconciler layers.

use crate::arm::{ArmIdError, CloudError, PollerError, classify_cloud_error};
use crate::conditions::{ReadyConditionImpactingError, RetryClassification};
use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::identity::ConnectionError;
use std::time::Duration;
use thiserror::Error;

/// What the framework should do after a reconcile pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    pub requeue: bool,
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    /// Settled; nothing to do until the next change or resync
    pub fn done() -> Self {
        Self::default()
    }

    /// Come back after the configured poll interval
    pub fn requeue() -> Self {
        Self {
            requeue: true,
            requeue_after: None,
        }
    }

    pub fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue: true,
            requeue_after: Some(delay),
        }
    }

    pub fn is_done(&self) -> bool {
        !self.requeue && self.requeue_after.is_none()
    }
}

/// Per-resource error backoff, keyed by `namespace/name` in the context
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
    pub retry: RetryClassification,
}

impl BackoffState {
    pub fn new(retry: RetryClassification, config: &ControllerConfig) -> Self {
        Self {
            backoff: FibonacciBackoff::for_retry(retry, config),
            error_count: 0,
            retry,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Dictates the Ready condition; see `ReadyConditionImpactingError`
    #[error(transparent)]
    ReadyCondition(#[from] ReadyConditionImpactingError),
    #[error("resource is currently deleting; it can not be applied")]
    CurrentlyDeleting,
    #[error("cannot {action} with no resume token")]
    MissingResumeToken { action: &'static str },
    #[error("cannot {action}: expected poller {expected:?}, found {actual:?}")]
    UnexpectedPoller {
        action: &'static str,
        expected: &'static str,
        actual: String,
    },
    #[error("cannot {action}: {source}")]
    Poller {
        action: &'static str,
        #[source]
        source: PollerError,
    },
    #[error("invalid resource ID: {0}")]
    ResourceId(#[from] ArmIdError),
    #[error("could not determine the ARM ID of {0}")]
    UnresolvedResourceId(String),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Extension(String),
}

impl ReconcilerError {
    /// Route a failed ARM call through the classifier
    pub fn from_cloud(err: &CloudError) -> Self {
        ReconcilerError::ReadyCondition(classify_cloud_error(Some(err)).into_ready_error())
    }

    pub fn ready_error(&self) -> Option<&ReadyConditionImpactingError> {
        match self {
            ReconcilerError::ReadyCondition(e) => Some(e),
            _ => None,
        }
    }

    /// Ready-impacting view of this error, if it has one
    ///
    /// Credential problems become a `CredentialInvalid` warning; everything
    /// else without a condition of its own is left to the caller.
    pub fn to_ready_error(&self) -> Option<ReadyConditionImpactingError> {
        match self {
            ReconcilerError::ReadyCondition(e) => Some(e.clone()),
            ReconcilerError::Connection(e) => Some(e.to_ready_error()),
            _ => None,
        }
    }

    pub fn retry(&self) -> RetryClassification {
        self.to_ready_error()
            .map_or(RetryClassification::Fast, |e| e.retry)
    }

    /// Label for error metrics
    pub fn classification(&self) -> &'static str {
        match self.to_ready_error() {
            Some(e) if e.is_fatal() => "fatal",
            Some(e) if e.retry == RetryClassification::VerySlow => "retryable_very_slow",
            Some(_) => "retryable",
            None => "local",
        }
    }
}
