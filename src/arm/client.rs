//! # ARM Client
//!
//! The `ArmClient` trait is the only way the reconciler talks to Azure.
//! `GenericClient` implements it over plain REST with `reqwest`, using bearer
//! tokens from an `azure_core` token credential.
//!
//! Long-running operations follow the ARM async pattern: an
//! `Azure-AsyncOperation` URL reporting `status`, a `Location` URL answering
//! 202 until done, or, when neither is sent, the resource itself reporting
//! `properties.provisioningState`.

use super::errors::CloudError;
use super::poller::{OperationStatus, Poller, PollerKind, PollerState, parse_retry_after};
use super::resource_id::ArmId;
use crate::observability::metrics;
use async_trait::async_trait;
use azure_core::credentials::{TokenCredential, TokenRequestOptions};
use reqwest::Method;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, debug_span};

#[async_trait]
pub trait ArmClient: Send + Sync + fmt::Debug {
    /// PUT the resource, returning a poller for the operation
    async fn begin_create_or_update_by_id(
        &self,
        id: &ArmId,
        api_version: &str,
        resource: &Value,
    ) -> Result<Poller, CloudError>;

    /// DELETE the resource, returning a poller for the operation
    async fn begin_delete_by_id(&self, id: &ArmId, api_version: &str)
    -> Result<Poller, CloudError>;

    /// Advance a resumed poller by one request
    ///
    /// Leaves the poller done when the operation succeeded; a failed or
    /// cancelled operation is returned as an error.
    async fn poll(&self, poller: &mut Poller) -> Result<(), CloudError>;

    async fn get_by_id(&self, id: &ArmId, api_version: &str) -> Result<Value, CloudError>;

    /// HEAD the resource, for kinds that do not support GET
    async fn check_existence_by_id(&self, id: &ArmId, api_version: &str)
    -> Result<bool, CloudError>;

    /// POST an action such as `listKeys` on the resource
    async fn invoke_action(
        &self,
        id: &ArmId,
        action: &str,
        api_version: &str,
    ) -> Result<Value, CloudError>;
}

/// The parts of an HTTP response the LRO protocol looks at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub async_operation: Option<String>,
    pub location: Option<String>,
    pub retry_after: Option<String>,
    pub body: Value,
}

impl RawResponse {
    async fn from_response(response: reqwest::Response) -> Self {
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let status = response.status().as_u16();
        let async_operation = header("azure-asyncoperation");
        let location = header("location");
        let retry_after = header("retry-after");
        let body = match response.bytes().await {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
            _ => Value::Null,
        };
        Self {
            status,
            async_operation,
            location,
            retry_after,
            body,
        }
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Suggested delay before the next request
    pub fn retry_after(&self) -> Option<Duration> {
        parse_retry_after(self.retry_after.as_deref())
    }
}

/// Build a cloud error from the standard ARM `{"error": {...}}` envelope
pub fn cloud_error_from(raw: &RawResponse) -> CloudError {
    let error = &raw.body["error"];
    let code = error["code"].as_str().unwrap_or_default();
    let message = match (error["message"].as_str(), &raw.body) {
        (Some(message), _) => message.to_string(),
        (None, Value::String(text)) if !text.is_empty() => text.clone(),
        _ => format!("request failed with HTTP status {}", raw.status),
    };
    CloudError::new(Some(raw.status), code, message)
}

fn provisioning_state(body: &Value) -> Option<&str> {
    body["properties"]["provisioningState"].as_str()
}

fn failed_operation_error(raw: &RawResponse, status: &str) -> CloudError {
    let error = &raw.body["error"];
    let code = error["code"].as_str().unwrap_or(status);
    let message = error["message"]
        .as_str()
        .map_or_else(|| format!("operation finished with status {status}"), str::to_string);
    CloudError::new(Some(raw.status), code, message)
}

/// Interpret the response to the initial PUT or DELETE
pub fn begin_result(
    kind: PollerKind,
    method: &str,
    resource_url: &str,
    raw: &RawResponse,
) -> Result<Poller, CloudError> {
    if !raw.is_success() {
        return Err(cloud_error_from(raw));
    }

    let pending = raw.async_operation.is_some()
        || (raw.status == 202 && raw.location.is_some())
        || match kind {
            PollerKind::CreateOrUpdate => {
                provisioning_state(&raw.body).is_some_and(|state| state != "Succeeded")
            }
            PollerKind::Delete => raw.status == 202,
        };

    let mut poller = Poller::new(PollerState {
        kind,
        method: method.to_string(),
        resource_url: resource_url.to_string(),
        async_operation_url: raw.async_operation.clone(),
        location_url: raw.location.clone(),
        status: if pending {
            OperationStatus::InProgress
        } else {
            OperationStatus::Succeeded
        },
    });
    poller.set_retry_after(raw.retry_after());
    Ok(poller)
}

/// Which URL a poll request was sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTarget {
    AsyncOperation,
    Location,
    Resource,
}

pub fn poll_target(state: &PollerState) -> (PollTarget, &str) {
    if let Some(url) = state.async_operation_url.as_deref() {
        (PollTarget::AsyncOperation, url)
    } else if let Some(url) = state.location_url.as_deref() {
        (PollTarget::Location, url)
    } else {
        (PollTarget::Resource, state.resource_url.as_str())
    }
}

/// Apply one poll response to the poller
pub fn advance_poller(
    poller: &mut Poller,
    target: PollTarget,
    raw: &RawResponse,
) -> Result<(), CloudError> {
    poller.set_retry_after(raw.retry_after());
    let deleting = poller.kind() == PollerKind::Delete;

    match target {
        PollTarget::AsyncOperation => {
            if !raw.is_success() {
                return Err(cloud_error_from(raw));
            }
            match raw.body["status"].as_str().unwrap_or_default() {
                "Succeeded" => poller.mark_succeeded(),
                status @ ("Failed" | "Canceled") => {
                    return Err(failed_operation_error(raw, status));
                }
                _ => {}
            }
        }
        PollTarget::Location => match raw.status {
            202 => {}
            404 if deleting => poller.mark_succeeded(),
            _ if raw.is_success() => poller.mark_succeeded(),
            _ => return Err(cloud_error_from(raw)),
        },
        PollTarget::Resource => {
            if deleting {
                match raw.status {
                    404 => poller.mark_succeeded(),
                    _ if raw.is_success() => {}
                    _ => return Err(cloud_error_from(raw)),
                }
            } else {
                if !raw.is_success() {
                    return Err(cloud_error_from(raw));
                }
                match provisioning_state(&raw.body) {
                    None | Some("Succeeded") => poller.mark_succeeded(),
                    Some(state @ ("Failed" | "Canceled")) => {
                        return Err(failed_operation_error(raw, state));
                    }
                    Some(_) => {}
                }
            }
        }
    }
    Ok(())
}

/// REST implementation of `ArmClient`
pub struct GenericClient {
    http: reqwest::Client,
    endpoint: String,
    scope: String,
    credential: Arc<dyn TokenCredential>,
}

impl fmt::Debug for GenericClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl GenericClient {
    /// Create a client for the given ARM endpoint
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(
        endpoint: &str,
        credential: Arc<dyn TokenCredential>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            scope: format!("{endpoint}/.default"),
            endpoint,
            credential,
        })
    }

    fn url(&self, id: &ArmId, suffix: &str, api_version: &str) -> String {
        format!("{}{}{}?api-version={}", self.endpoint, id, suffix, api_version)
    }

    async fn token(&self) -> Result<String, CloudError> {
        let scopes = [self.scope.as_str()];
        let token = self
            .credential
            .get_token(&scopes, Some(TokenRequestOptions::default()))
            .await
            .map_err(|e| {
                CloudError::new(
                    None,
                    "AuthenticationFailed",
                    format!("failed to acquire ARM access token: {e}"),
                )
            })?;
        Ok(token.token.secret().to_string())
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse, CloudError> {
        let token = self.token().await?;
        let start = Instant::now();
        let span = debug_span!("arm.request", http.method = %method, http.url = url);

        async move {
            let mut request = self.http.request(method.clone(), url).bearer_auth(token);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await.map_err(|e| {
                metrics::record_arm_request(method.as_str(), "transport_error", start.elapsed());
                CloudError::transport(format!("{method} {url} failed: {e}"))
            })?;
            let raw = RawResponse::from_response(response).await;
            metrics::record_arm_request(method.as_str(), &raw.status.to_string(), start.elapsed());
            debug!(
                status = raw.status,
                duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                "ARM request completed"
            );
            Ok(raw)
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl ArmClient for GenericClient {
    async fn begin_create_or_update_by_id(
        &self,
        id: &ArmId,
        api_version: &str,
        resource: &Value,
    ) -> Result<Poller, CloudError> {
        let url = self.url(id, "", api_version);
        let raw = self.send(Method::PUT, &url, Some(resource)).await?;
        begin_result(PollerKind::CreateOrUpdate, "PUT", &url, &raw)
    }

    async fn begin_delete_by_id(
        &self,
        id: &ArmId,
        api_version: &str,
    ) -> Result<Poller, CloudError> {
        let url = self.url(id, "", api_version);
        let raw = self.send(Method::DELETE, &url, None).await?;
        begin_result(PollerKind::Delete, "DELETE", &url, &raw)
    }

    async fn poll(&self, poller: &mut Poller) -> Result<(), CloudError> {
        if poller.done() {
            return Ok(());
        }
        let (target, url) = poll_target(poller.state());
        let url = url.to_string();
        let raw = self.send(Method::GET, &url, None).await?;
        advance_poller(poller, target, &raw)
    }

    async fn get_by_id(&self, id: &ArmId, api_version: &str) -> Result<Value, CloudError> {
        let raw = self
            .send(Method::GET, &self.url(id, "", api_version), None)
            .await?;
        if raw.is_success() {
            Ok(raw.body)
        } else {
            Err(cloud_error_from(&raw))
        }
    }

    async fn check_existence_by_id(
        &self,
        id: &ArmId,
        api_version: &str,
    ) -> Result<bool, CloudError> {
        let raw = self
            .send(Method::HEAD, &self.url(id, "", api_version), None)
            .await?;
        match raw.status {
            404 => Ok(false),
            _ if raw.is_success() => Ok(true),
            _ => Err(cloud_error_from(&raw)),
        }
    }

    async fn invoke_action(
        &self,
        id: &ArmId,
        action: &str,
        api_version: &str,
    ) -> Result<Value, CloudError> {
        let url = self.url(id, &format!("/{action}"), api_version);
        let raw = self.send(Method::POST, &url, None).await?;
        if raw.is_success() {
            Ok(raw.body)
        } else {
            Err(cloud_error_from(&raw))
        }
    }
}
