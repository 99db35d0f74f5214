//! # Kubernetes Exporters
//!
//! Publishes values of a reconciled resource into Secrets and ConfigMaps.
//!
//! Values come from two places: the `operatorSpec` destination expressions
//! evaluated over the JSON form of the object, and kind-specific exporter
//! hooks. Everything is merged by `(kind, name)` and written with
//! server-side apply, owned by the managed resource.

use crate::constants::CONTROLLER_NAME;
use crate::crd::{ArmResource, DestinationExpression};
use crate::conditions::{ReadyConditionImpactingError, reasons};
use crate::observability::metrics;
use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{ObjectMeta, Patch, PatchParams};
use kube::{Api, Client};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Root every expression path starts from
const SELF_ROOT: &str = "self";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExportKind {
    ConfigMap,
    Secret,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::ConfigMap => "ConfigMap",
            ExportKind::Secret => "Secret",
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single key destined for a Secret or ConfigMap
#[derive(Clone, PartialEq, Eq)]
pub struct ExportedValue {
    pub kind: ExportKind,
    pub name: String,
    pub key: String,
    pub value: String,
}

impl fmt::Debug for ExportedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self.kind {
            ExportKind::Secret => "<redacted>",
            ExportKind::ConfigMap => self.value.as_str(),
        };
        f.debug_struct("ExportedValue")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("key", &self.key)
            .field("value", &value)
            .finish()
    }
}

/// A fully merged Secret or ConfigMap, ready to apply
#[derive(Clone, PartialEq, Eq)]
pub struct ExportedObject {
    pub kind: ExportKind,
    pub name: String,
    pub data: BTreeMap<String, String>,
}

impl fmt::Debug for ExportedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedObject")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("expression {0:?} must start with \"self\"")]
    InvalidPath(String),
    #[error("expression {0:?} does not resolve to a value")]
    Unresolved(String),
    #[error("expression {0:?} must resolve to a string, number or boolean")]
    NotScalar(String),
    #[error("expression {0:?} has no key, so it must resolve to a map of scalars")]
    NotMap(String),
    #[error("{kind} {name} key {key:?} is exported twice with different values")]
    Collision {
        kind: ExportKind,
        name: String,
        key: String,
    },
    #[error("object has no uid yet, cannot own exported resources")]
    MissingOwner,
    #[error("failed to serialize object: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to apply {kind} {name}: {source}")]
    Apply {
        kind: ExportKind,
        name: String,
        #[source]
        source: kube::Error,
    },
}

impl ExportError {
    /// The cloud resource may be fine; it is the local write that failed
    pub fn to_ready_error(&self) -> ReadyConditionImpactingError {
        ReadyConditionImpactingError::fatal(reasons::ADDITIONAL_KUBERNETES_OBJ_WRITE_FAILURE, self)
    }
}

/// Follow a dotted `self.a.b` path through a JSON document
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Result<&'a Value, ExportError> {
    let mut segments = path.trim().split('.');
    if segments.next() != Some(SELF_ROOT) {
        return Err(ExportError::InvalidPath(path.to_string()));
    }
    let mut current = root;
    for segment in segments {
        if segment.is_empty() {
            return Err(ExportError::InvalidPath(path.to_string()));
        }
        current = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
        .ok_or_else(|| ExportError::Unresolved(path.to_string()))?;
    }
    if current.is_null() {
        return Err(ExportError::Unresolved(path.to_string()));
    }
    Ok(current)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Evaluate destination expressions of one kind against the object's JSON
pub fn evaluate_expressions(
    obj: &Value,
    kind: ExportKind,
    expressions: &[DestinationExpression],
) -> Result<Vec<ExportedValue>, ExportError> {
    let mut values = Vec::new();
    for expression in expressions {
        let resolved = resolve_path(obj, &expression.value)?;
        match &expression.key {
            Some(key) => {
                let value = scalar_to_string(resolved)
                    .ok_or_else(|| ExportError::NotScalar(expression.value.clone()))?;
                values.push(ExportedValue {
                    kind,
                    name: expression.name.clone(),
                    key: key.clone(),
                    value,
                });
            }
            None => {
                let map = resolved
                    .as_object()
                    .ok_or_else(|| ExportError::NotMap(expression.value.clone()))?;
                for (key, entry) in map {
                    let value = scalar_to_string(entry)
                        .ok_or_else(|| ExportError::NotMap(expression.value.clone()))?;
                    values.push(ExportedValue {
                        kind,
                        name: expression.name.clone(),
                        key: key.clone(),
                        value,
                    });
                }
            }
        }
    }
    Ok(values)
}

/// Values requested by the object's `operatorSpec`
pub fn operator_spec_exports<K: ArmResource>(obj: &K) -> Result<Vec<ExportedValue>, ExportError> {
    let Some(spec) = obj.operator_spec().filter(|s| !s.is_empty()) else {
        return Ok(Vec::new());
    };
    let json = serde_json::to_value(obj)?;
    let mut values = evaluate_expressions(&json, ExportKind::ConfigMap, &spec.config_map_expressions)?;
    values.extend(evaluate_expressions(&json, ExportKind::Secret, &spec.secret_expressions)?);
    Ok(values)
}

/// Group values into objects by `(kind, name)`
///
/// The same key twice with the same value is kept once; with different
/// values it is a collision.
pub fn merge_exports(values: Vec<ExportedValue>) -> Result<Vec<ExportedObject>, ExportError> {
    let mut merged: BTreeMap<(ExportKind, String), BTreeMap<String, String>> = BTreeMap::new();
    for value in values {
        let data = merged.entry((value.kind, value.name.clone())).or_default();
        match data.get(&value.key) {
            Some(existing) if *existing != value.value => {
                return Err(ExportError::Collision {
                    kind: value.kind,
                    name: value.name,
                    key: value.key,
                });
            }
            Some(_) => {}
            None => {
                data.insert(value.key, value.value);
            }
        }
    }
    Ok(merged
        .into_iter()
        .map(|((kind, name), data)| ExportedObject { kind, name, data })
        .collect())
}

/// Writes exported objects into the cluster
#[async_trait]
pub trait ObjectApplier: Send + Sync + fmt::Debug {
    async fn apply(
        &self,
        namespace: &str,
        owner: &OwnerReference,
        objects: &[ExportedObject],
    ) -> Result<(), ExportError>;
}

pub struct KubeObjectApplier {
    client: Client,
}

impl fmt::Debug for KubeObjectApplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeObjectApplier").finish_non_exhaustive()
    }
}

impl KubeObjectApplier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn exported_metadata(object: &ExportedObject, namespace: &str, owner: &OwnerReference) -> ObjectMeta {
    ObjectMeta {
        name: Some(object.name.clone()),
        namespace: Some(namespace.to_string()),
        owner_references: Some(vec![owner.clone()]),
        labels: Some(BTreeMap::from([(
            "app.kubernetes.io/managed-by".to_string(),
            CONTROLLER_NAME.to_string(),
        )])),
        ..Default::default()
    }
}

#[async_trait]
impl ObjectApplier for KubeObjectApplier {
    async fn apply(
        &self,
        namespace: &str,
        owner: &OwnerReference,
        objects: &[ExportedObject],
    ) -> Result<(), ExportError> {
        let params = PatchParams::apply(CONTROLLER_NAME).force();
        for object in objects {
            let metadata = exported_metadata(object, namespace, owner);
            let result = match object.kind {
                ExportKind::ConfigMap => {
                    let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
                    let config_map = ConfigMap {
                        metadata,
                        data: Some(object.data.clone()),
                        ..Default::default()
                    };
                    api.patch(&object.name, &params, &Patch::Apply(&config_map))
                        .await
                        .map(|_| ())
                }
                ExportKind::Secret => {
                    let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
                    let secret = Secret {
                        metadata,
                        data: Some(
                            object
                                .data
                                .iter()
                                .map(|(k, v)| (k.clone(), ByteString(v.clone().into_bytes())))
                                .collect(),
                        ),
                        ..Default::default()
                    };
                    api.patch(&object.name, &params, &Patch::Apply(&secret))
                        .await
                        .map(|_| ())
                }
            };
            result.map_err(|source| ExportError::Apply {
                kind: object.kind,
                name: object.name.clone(),
                source,
            })?;
            metrics::increment_exported_objects(object.kind.as_str());
            debug!(
                kind = %object.kind,
                name = %object.name,
                namespace,
                keys = object.data.len(),
                "Applied exported object"
            );
        }
        Ok(())
    }
}
