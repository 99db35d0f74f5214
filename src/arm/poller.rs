//! # Resumable Pollers
//!
//! A long-running ARM operation is never awaited inside a reconcile. Instead
//! its polling state is serialised into an opaque resume token, stored on the
//! object, and resumed by the next reconcile.
//!
//! The token is `base64(json(PollerState))`. Its kind must match the kind the
//! caller asks for; a create token is never resumed as a delete.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Poller identifier stored alongside a create/update resume token
pub const CREATE_POLLER_ID: &str = "GenericClient.CreateOrUpdateByID";

/// Poller identifier stored alongside a delete resume token
pub const DELETE_POLLER_ID: &str = "GenericClient.DeleteByID";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollerError {
    #[error("poller resume token is not valid: {0}")]
    InvalidToken(String),
    #[error("poller resume token is for {actual:?} but {expected:?} was requested")]
    KindMismatch {
        expected: PollerKind,
        actual: PollerKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PollerKind {
    #[serde(rename = "GenericClient.CreateOrUpdateByID")]
    CreateOrUpdate,
    #[serde(rename = "GenericClient.DeleteByID")]
    Delete,
}

impl PollerKind {
    pub fn id(&self) -> &'static str {
        match self {
            PollerKind::CreateOrUpdate => CREATE_POLLER_ID,
            PollerKind::Delete => DELETE_POLLER_ID,
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            CREATE_POLLER_ID => Some(PollerKind::CreateOrUpdate),
            DELETE_POLLER_ID => Some(PollerKind::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    InProgress,
    Succeeded,
}

/// Everything needed to continue polling in a later reconcile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerState {
    pub kind: PollerKind,
    pub method: String,
    pub resource_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_operation_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_url: Option<String>,
    pub status: OperationStatus,
}

/// Handle to an in-progress (or already finished) ARM operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poller {
    state: PollerState,
    retry_after: Option<Duration>,
}

impl Poller {
    pub fn new(state: PollerState) -> Self {
        Self {
            state,
            retry_after: None,
        }
    }

    /// Operation that finished synchronously
    pub fn completed(kind: PollerKind, method: &str, resource_url: &str) -> Self {
        Self::new(PollerState {
            kind,
            method: method.to_string(),
            resource_url: resource_url.to_string(),
            async_operation_url: None,
            location_url: None,
            status: OperationStatus::Succeeded,
        })
    }

    /// Rebuild a poller from a stored token
    pub fn resume(expected: PollerKind, token: &str) -> Result<Self, PollerError> {
        let bytes = STANDARD
            .decode(token.trim())
            .map_err(|e| PollerError::InvalidToken(e.to_string()))?;
        let state: PollerState =
            serde_json::from_slice(&bytes).map_err(|e| PollerError::InvalidToken(e.to_string()))?;
        if state.kind != expected {
            return Err(PollerError::KindMismatch {
                expected,
                actual: state.kind,
            });
        }
        Ok(Self::new(state))
    }

    pub fn resume_token(&self) -> String {
        // PollerState only holds strings and unit enums; serialisation cannot fail
        let json = serde_json::to_vec(&self.state).unwrap_or_default();
        STANDARD.encode(json)
    }

    pub fn kind(&self) -> PollerKind {
        self.state.kind
    }

    pub fn id(&self) -> &'static str {
        self.state.kind.id()
    }

    pub fn done(&self) -> bool {
        self.state.status == OperationStatus::Succeeded
    }

    /// Server-suggested delay before the next poll
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub fn set_retry_after(&mut self, retry_after: Option<Duration>) {
        self.retry_after = retry_after;
    }

    pub fn state(&self) -> &PollerState {
        &self.state
    }

    pub fn mark_succeeded(&mut self) {
        self.state.status = OperationStatus::Succeeded;
    }
}

/// Parse a `Retry-After` header expressed in seconds
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
