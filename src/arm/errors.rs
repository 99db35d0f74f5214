//! # Cloud Errors
//!
//! The error returned by failed ARM calls, and the classifier that decides
//! whether such a failure is retried or surfaced as a terminal condition.
//!
//! Classification is table driven:
//!
//! 1. no error at all → retryable `UnknownError`
//! 2. empty code → retryable (transient, nothing better to go on)
//! 3. known code → retryable, retryable-very-slow (`ScopeLocked`) or fatal
//! 4. unknown code → fatal only for HTTP 400, retryable otherwise

use crate::conditions::{ConditionSeverity, ReadyConditionImpactingError, RetryClassification};
use thiserror::Error;

pub const UNKNOWN_ERROR_CODE: &str = "UnknownError";
pub const UNKNOWN_ERROR_MESSAGE: &str = "There was an unknown error from Azure";

/// A failed ARM call
///
/// `status` is absent for transport failures that never produced a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", self.describe())]
pub struct CloudError {
    pub status: Option<u16>,
    pub code: String,
    pub message: String,
}

impl CloudError {
    pub fn new(status: Option<u16>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Transport-level failure with no HTTP response
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, "", message)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// ARM reports a missing resource either by status or by code
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404) || matches!(self.code.as_str(), "ResourceNotFound" | "NotFound")
    }

    fn describe(&self) -> String {
        match (self.status, self.code.is_empty()) {
            (Some(status), false) => format!("{} (HTTP {}): {}", self.code, status, self.message),
            (Some(status), true) => format!("HTTP {}: {}", status, self.message),
            (None, false) => format!("{}: {}", self.code, self.message),
            (None, true) => self.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    Fatal,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Retryable => "retryable",
            Classification::Fatal => "fatal",
        }
    }
}

/// Named backoff tier overriding the default retry timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryHint {
    VerySlow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudErrorDetails {
    pub classification: Classification,
    pub code: String,
    pub message: String,
    pub retry_hint: Option<RetryHint>,
}

impl CloudErrorDetails {
    fn new(classification: Classification, code: &str, message: &str) -> Self {
        Self {
            classification,
            code: code.to_string(),
            message: message.to_string(),
            retry_hint: None,
        }
    }

    /// Ready condition this failure should produce
    ///
    /// Fatal → Error severity, never retried. Retryable → Warning with the
    /// hinted backoff tier.
    pub fn into_ready_error(self) -> ReadyConditionImpactingError {
        let reason = if self.code.is_empty() {
            UNKNOWN_ERROR_CODE.to_string()
        } else {
            self.code
        };
        match self.classification {
            Classification::Fatal => ReadyConditionImpactingError::new(
                ConditionSeverity::Error,
                reason,
                self.message,
                RetryClassification::None,
            ),
            Classification::Retryable => {
                let retry = match self.retry_hint {
                    Some(RetryHint::VerySlow) => RetryClassification::VerySlow,
                    None => RetryClassification::Fast,
                };
                ReadyConditionImpactingError::new(
                    ConditionSeverity::Warning,
                    reason,
                    self.message,
                    retry,
                )
            }
        }
    }
}

/// Transient infrastructure, registration, quota and not-found conditions
const RETRYABLE_CODES: &[&str] = &[
    "AnotherOperationInProgress",
    "AuthorizationFailed",
    "AllocationFailed",
    "Conflict",
    "ConflictingServerOperation",
    "FailedIdentityOperation",
    "InvalidResourceReference",
    "InvalidSubscriptionRegistrationState",
    "LinkedAuthorizationFailed",
    "MissingRegistrationForLocation",
    "MissingSubscriptionRegistration",
    "NoRegisteredProviderFound",
    "NotFound",
    "ParentResourceNotFound",
    "ResourceGroupNotFound",
    "ResourceNotFound",
    "ResourceQuotaExceeded",
    "SubscriptionNotRegistered",
];

/// A management lock blocks the operation until a human removes it
const VERY_SLOW_RETRYABLE_CODES: &[&str] = &["ScopeLocked"];

/// Malformed requests that cannot succeed without a spec change
const FATAL_CODES: &[&str] = &[
    "BadRequest",
    "BadRequestFormat",
    "InvalidParameter",
    "InvalidParameterValue",
    "InvalidRequestContent",
    "InvalidRequestFormat",
    "InvalidResourceGroupLocation",
    "InvalidResourceName",
    "InvalidResourceType",
    "InvalidTemplate",
    "InvalidValuesForRequestParameters",
    "LocationNotAvailableForResourceType",
    "LocationRequired",
    "MissingRequiredParameter",
    "PropertyChangeNotAllowed",
    "RequestDisallowedByPolicy",
    "ReservedResourceName",
    "SkuNotAvailable",
    "SubscriptionNotFound",
];

/// Classify a failed ARM call
pub fn classify_cloud_error(err: Option<&CloudError>) -> CloudErrorDetails {
    let Some(err) = err else {
        return CloudErrorDetails::new(
            Classification::Retryable,
            UNKNOWN_ERROR_CODE,
            UNKNOWN_ERROR_MESSAGE,
        );
    };

    let code = err.code();
    let message = err.message();
    if code.is_empty() {
        return CloudErrorDetails::new(Classification::Retryable, code, message);
    }

    if RETRYABLE_CODES.contains(&code) {
        return CloudErrorDetails::new(Classification::Retryable, code, message);
    }

    if VERY_SLOW_RETRYABLE_CODES.contains(&code) {
        return CloudErrorDetails {
            retry_hint: Some(RetryHint::VerySlow),
            ..CloudErrorDetails::new(Classification::Retryable, code, message)
        };
    }

    if FATAL_CODES.contains(&code) {
        return CloudErrorDetails::new(Classification::Fatal, code, message);
    }

    CloudErrorDetails::new(classify_by_status(err.status), code, message)
}

fn classify_by_status(status: Option<u16>) -> Classification {
    match status {
        Some(400) => Classification::Fatal,
        _ => Classification::Retryable,
    }
}
