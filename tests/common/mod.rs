//! Shared fakes for reconciler integration tests
//!
//! `FakeArmClient` replays scripted responses and records every call, so
//! tests can assert both on the state machine's decisions and on what it
//! sent to Azure.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use arm_resource_controller::arm::poller::{OperationStatus, PollerState};
use arm_resource_controller::arm::{ArmClient, ArmId, CloudError, Poller, PollerKind};
use arm_resource_controller::conditions::{ReadyConditionImpactingError, reasons};
use arm_resource_controller::controller::events::NoopEventPublisher;
use arm_resource_controller::controller::reconciler::extensions::{
    Deleter, PreReconciliationChecker,
};
use arm_resource_controller::controller::reconciler::{
    ArmReconciler, ExportError, ExportedObject, ObjectApplier, PreReconcileCheckResult,
    ReconcilerError, ReferenceResolver, ResolvedOwner, ResourceExtension,
};
use arm_resource_controller::crd::{
    ArmResource, KnownResourceReference, ResourceGroup, ResourceGroupSpec, Sku, StorageAccount,
    StorageAccountSpec,
};
use arm_resource_controller::identity::{
    ArmClientFactory, Connection, ConnectionCache, ConnectionError, Credential,
    CredentialMaterial, CredentialProvider, CredentialSource,
};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SUBSCRIPTION_ID: &str = "00000000-0000-0000-0000-000000000001";
pub const NAMESPACE: &str = "team-a";

/// One scripted answer to `poll`
#[derive(Debug, Clone)]
pub enum PollStep {
    Done,
    InProgress(Option<Duration>),
    Fail(CloudError),
}

#[derive(Debug, Default)]
pub struct FakeArmClient {
    puts: Mutex<VecDeque<Result<Poller, CloudError>>>,
    deletes: Mutex<VecDeque<Result<Poller, CloudError>>>,
    polls: Mutex<VecDeque<PollStep>>,
    gets: Mutex<VecDeque<Result<Value, CloudError>>>,
    actions: Mutex<VecDeque<Result<Value, CloudError>>>,
    exists: Mutex<VecDeque<bool>>,
    calls: Mutex<Vec<String>>,
    bodies: Mutex<Vec<Value>>,
}

impl FakeArmClient {
    pub fn on_put(&self, response: Result<Poller, CloudError>) {
        self.puts.lock().unwrap().push_back(response);
    }

    pub fn on_delete(&self, response: Result<Poller, CloudError>) {
        self.deletes.lock().unwrap().push_back(response);
    }

    pub fn on_poll(&self, step: PollStep) {
        self.polls.lock().unwrap().push_back(step);
    }

    pub fn on_get(&self, response: Result<Value, CloudError>) {
        self.gets.lock().unwrap().push_back(response);
    }

    pub fn on_action(&self, response: Result<Value, CloudError>) {
        self.actions.lock().unwrap().push_back(response);
    }

    /// Next HEAD answer; HEAD says the resource exists once these run out
    pub fn on_exists(&self, exists: bool) {
        self.exists.lock().unwrap().push_back(exists);
    }

    /// `METHOD id` for every call, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn put_bodies(&self) -> Vec<Value> {
        self.bodies.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ArmClient for FakeArmClient {
    async fn begin_create_or_update_by_id(
        &self,
        id: &ArmId,
        _api_version: &str,
        resource: &Value,
    ) -> Result<Poller, CloudError> {
        self.record(format!("PUT {id}"));
        self.bodies.lock().unwrap().push(resource.clone());
        self.puts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CloudError::transport("unexpected PUT")))
    }

    async fn begin_delete_by_id(&self, id: &ArmId, _api_version: &str) -> Result<Poller, CloudError> {
        self.record(format!("DELETE {id}"));
        self.deletes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CloudError::transport("unexpected DELETE")))
    }

    async fn poll(&self, poller: &mut Poller) -> Result<(), CloudError> {
        self.record(format!("POLL {}", poller.state().resource_url));
        let step = self
            .polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| PollStep::Fail(CloudError::transport("unexpected poll")));
        match step {
            PollStep::Done => {
                poller.mark_succeeded();
                Ok(())
            }
            PollStep::InProgress(retry_after) => {
                poller.set_retry_after(retry_after);
                Ok(())
            }
            PollStep::Fail(e) => Err(e),
        }
    }

    async fn get_by_id(&self, id: &ArmId, _api_version: &str) -> Result<Value, CloudError> {
        self.record(format!("GET {id}"));
        self.gets.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(json!({
                "id": id.as_str(),
                "properties": { "provisioningState": "Succeeded" }
            }))
        })
    }

    async fn check_existence_by_id(&self, id: &ArmId, _api_version: &str) -> Result<bool, CloudError> {
        self.record(format!("HEAD {id}"));
        Ok(self.exists.lock().unwrap().pop_front().unwrap_or(true))
    }

    async fn invoke_action(
        &self,
        id: &ArmId,
        action: &str,
        _api_version: &str,
    ) -> Result<Value, CloudError> {
        self.record(format!("POST {id}/{action}"));
        self.actions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CloudError::transport("unexpected action")))
    }
}

/// Poller for an operation ARM accepted but has not finished
pub fn in_progress(kind: PollerKind, id: &str) -> Poller {
    Poller::new(PollerState {
        kind,
        method: match kind {
            PollerKind::CreateOrUpdate => "PUT",
            PollerKind::Delete => "DELETE",
        }
        .to_string(),
        resource_url: format!("https://management.azure.com{id}"),
        async_operation_url: Some(format!(
            "https://management.azure.com/subscriptions/{SUBSCRIPTION_ID}/providers/Microsoft.Resources/operations/op-1"
        )),
        location_url: None,
        status: OperationStatus::InProgress,
    })
}

pub fn completed(kind: PollerKind, id: &str) -> Poller {
    let method = match kind {
        PollerKind::CreateOrUpdate => "PUT",
        PollerKind::Delete => "DELETE",
    };
    Poller::completed(kind, method, &format!("https://management.azure.com{id}"))
}

#[derive(Debug)]
struct FixedProvider;

#[async_trait]
impl CredentialProvider for FixedProvider {
    async fn credential_for(
        &self,
        _namespace: &str,
        _credential_from: Option<&str>,
    ) -> Result<Credential, ConnectionError> {
        Ok(Credential::new(
            CredentialSource::Global,
            CredentialMaterial::new(SUBSCRIPTION_ID, None, None, None),
        ))
    }
}

#[derive(Debug)]
struct FixedFactory {
    client: Arc<FakeArmClient>,
}

impl ArmClientFactory for FixedFactory {
    fn build(&self, _credential: &Credential) -> Result<Arc<dyn ArmClient>, ConnectionError> {
        Ok(Arc::clone(&self.client) as Arc<dyn ArmClient>)
    }
}

/// Resolves every owner to the same `ResourceGroup`
#[derive(Debug, Default)]
pub struct FakeResolver {
    pub owner: Option<ResolvedOwner>,
}

impl FakeResolver {
    pub fn with_owner(arm_id: Option<&str>) -> Self {
        Self {
            owner: Some(ResolvedOwner {
                arm_id: arm_id.map(|id| ArmId::parse(id).unwrap()),
                owner_reference: OwnerReference {
                    api_version: "resources.azure.com/v1".to_string(),
                    kind: "ResourceGroup".to_string(),
                    name: "app-rg".to_string(),
                    uid: "rg-uid".to_string(),
                    ..Default::default()
                },
            }),
        }
    }
}

#[async_trait]
impl ReferenceResolver for FakeResolver {
    async fn resolve_owner(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ResolvedOwner, ReconcilerError> {
        self.owner.clone().ok_or_else(|| {
            ReadyConditionImpactingError::warning(
                reasons::REFERENCE_NOT_FOUND,
                format!("owner ResourceGroup {namespace}/{name} does not exist"),
            )
            .into()
        })
    }
}

#[derive(Debug, Default)]
pub struct RecordingApplier {
    applied: Mutex<Vec<ExportedObject>>,
    failing: Mutex<bool>,
}

impl RecordingApplier {
    pub fn applied(&self) -> Vec<ExportedObject> {
        self.applied.lock().unwrap().clone()
    }

    /// Every later apply fails as if the object could not be serialized
    pub fn fail_applies(&self) {
        *self.failing.lock().unwrap() = true;
    }
}

#[async_trait]
impl ObjectApplier for RecordingApplier {
    async fn apply(
        &self,
        _namespace: &str,
        _owner: &OwnerReference,
        objects: &[ExportedObject],
    ) -> Result<(), ExportError> {
        if *self.failing.lock().unwrap() {
            let err = serde_json::from_str::<Value>("{").unwrap_err();
            return Err(ExportError::Serialization(err));
        }
        self.applied.lock().unwrap().extend_from_slice(objects);
        Ok(())
    }
}

/// Extension with a scripted pre-reconciliation check and deleter
#[derive(Debug, Default)]
pub struct ScriptedExtension {
    pre_check: Option<PreReconcileCheckResult>,
    custom_delete: bool,
    delete_result: Mutex<Option<Result<Poller, CloudError>>>,
    deleted: Mutex<Vec<String>>,
}

impl ScriptedExtension {
    pub fn with_pre_check(result: PreReconcileCheckResult) -> Self {
        Self {
            pre_check: Some(result),
            ..Default::default()
        }
    }

    pub fn with_deleter(result: Result<Poller, CloudError>) -> Self {
        Self {
            custom_delete: true,
            delete_result: Mutex::new(Some(result)),
            ..Default::default()
        }
    }

    /// IDs handed to the custom deleter
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

impl<K: ArmResource> ResourceExtension<K> for ScriptedExtension {
    fn pre_reconciliation_checker(&self) -> Option<&dyn PreReconciliationChecker<K>> {
        self.pre_check.as_ref().map(|_| self as &dyn PreReconciliationChecker<K>)
    }

    fn deleter(&self) -> Option<&dyn Deleter<K>> {
        self.custom_delete.then_some(self as &dyn Deleter<K>)
    }
}

#[async_trait]
impl<K: ArmResource> PreReconciliationChecker<K> for ScriptedExtension {
    async fn pre_reconcile_check(
        &self,
        _obj: &K,
        _connection: &Connection,
    ) -> Result<PreReconcileCheckResult, ReconcilerError> {
        Ok(self.pre_check.clone().unwrap_or(PreReconcileCheckResult::Proceed))
    }
}

#[async_trait]
impl<K: ArmResource> Deleter<K> for ScriptedExtension {
    async fn delete(&self, _obj: &K, id: &ArmId, _connection: &Connection) -> Result<Poller, CloudError> {
        self.deleted.lock().unwrap().push(id.to_string());
        self.delete_result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(CloudError::transport("unexpected custom delete")))
    }
}

/// A reconciler wired to fakes, plus handles to inspect them
pub struct Harness<K: ArmResource> {
    pub arm: Arc<FakeArmClient>,
    pub applier: Arc<RecordingApplier>,
    pub reconciler: ArmReconciler<K>,
}

pub fn harness<K: ArmResource>(
    extension: Arc<dyn ResourceExtension<K>>,
    resolver: FakeResolver,
) -> Harness<K> {
    let arm = Arc::new(FakeArmClient::default());
    let applier = Arc::new(RecordingApplier::default());
    let connections = Arc::new(ConnectionCache::new(
        Arc::new(FixedProvider),
        Arc::new(FixedFactory {
            client: Arc::clone(&arm),
        }),
    ));
    let reconciler = ArmReconciler::new(
        connections,
        extension,
        Arc::new(resolver),
        Arc::clone(&applier) as Arc<dyn ObjectApplier>,
        Arc::new(NoopEventPublisher),
    );
    Harness {
        arm,
        applier,
        reconciler,
    }
}

pub fn resource_group_id() -> String {
    format!("/subscriptions/{SUBSCRIPTION_ID}/resourceGroups/app-rg")
}

pub fn storage_account_id() -> String {
    format!(
        "{}/providers/Microsoft.Storage/storageAccounts/appstorage",
        resource_group_id()
    )
}

pub fn resource_group() -> ResourceGroup {
    let mut rg = ResourceGroup::new(
        "app-rg",
        ResourceGroupSpec {
            azure_name: "app-rg".to_string(),
            location: "westeurope".to_string(),
            tags: Default::default(),
            managed_by: None,
            operator_spec: None,
        },
    );
    rg.metadata.namespace = Some(NAMESPACE.to_string());
    rg.metadata.uid = Some("rg-uid".to_string());
    rg.metadata.generation = Some(1);
    rg
}

pub fn storage_account() -> StorageAccount {
    let mut sa = StorageAccount::new(
        "app-storage",
        StorageAccountSpec {
            azure_name: "appstorage".to_string(),
            owner: KnownResourceReference {
                name: "app-rg".to_string(),
            },
            location: "westeurope".to_string(),
            kind: "StorageV2".to_string(),
            sku: Sku {
                name: "Standard_LRS".to_string(),
                tier: None,
            },
            access_tier: None,
            tags: Default::default(),
            operator_spec: None,
        },
    );
    sa.metadata.namespace = Some(NAMESPACE.to_string());
    sa.metadata.uid = Some("sa-uid".to_string());
    sa.metadata.generation = Some(1);
    sa
}
