//! Reconcile passes against a scripted ARM client
//!
//! Each test drives `ArmReconciler` through one or more passes, carrying the
//! mutated object from pass to pass the way the controller does after
//! persisting it.

mod common;

use arm_resource_controller::arm::{
    ArmId, CREATE_POLLER_ID, CloudError, DELETE_POLLER_ID, PollerKind,
};
use arm_resource_controller::conditions::{
    Condition, ConditionSeverity, ConditionStatus, ReadyConditionImpactingError,
    RetryClassification, find_condition, ready_reason, reasons, set_condition,
    READY_CONDITION_TYPE,
};
use arm_resource_controller::controller::reconciler::annotations::{
    self, LATEST_RECONCILED_GENERATION_ANNOTATION, RESOURCE_ID_ANNOTATION,
};
use arm_resource_controller::controller::reconciler::{
    ExportKind, NoExtension, PreReconcileCheckResult, ReconcileResult, ReconcilerError,
    ResourceExtension, StorageAccountExtension,
};
use arm_resource_controller::crd::{
    ArmResource, ResourceGroup, SecretDestination, StorageAccount, StorageAccountOperatorSecrets,
    StorageAccountOperatorSpec,
};
use common::*;
use kube::Resource;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

fn rg_harness() -> Harness<ResourceGroup> {
    harness(Arc::new(NoExtension), FakeResolver::default())
}

fn annotation<'a, K: ArmResource>(obj: &'a K, key: &str) -> Option<&'a str> {
    obj.meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

fn ready<K: ArmResource>(obj: &K) -> Condition {
    find_condition(obj.conditions(), READY_CONDITION_TYPE)
        .cloned()
        .expect("Ready condition")
}

#[tokio::test]
async fn test_fresh_create_starts_long_running_put() {
    let h = rg_harness();
    h.arm.on_put(Ok(in_progress(PollerKind::CreateOrUpdate, &resource_group_id())));
    let mut rg = resource_group();

    let result = h.reconciler.create_or_update(&mut rg).await.unwrap();

    assert_eq!(result, ReconcileResult::requeue());
    assert_eq!(h.arm.calls(), vec![format!("PUT {}", resource_group_id())]);
    assert_eq!(h.arm.put_bodies(), vec![json!({"location": "westeurope"})]);

    let token = annotations::get_resume_token(&rg).unwrap();
    assert_eq!(token.poller_id, CREATE_POLLER_ID);
    assert!(!token.token.is_empty());
    assert_eq!(
        annotation(&rg, RESOURCE_ID_ANNOTATION),
        Some(resource_group_id().as_str())
    );
    assert_eq!(annotation(&rg, LATEST_RECONCILED_GENERATION_ANNOTATION), Some("1"));
    assert_eq!(ready_reason(rg.conditions()), Some(reasons::RECONCILING));
}

#[tokio::test]
async fn test_monitor_in_progress_honors_retry_after() {
    let h = rg_harness();
    h.arm.on_put(Ok(in_progress(PollerKind::CreateOrUpdate, &resource_group_id())));
    h.arm.on_poll(PollStep::InProgress(Some(Duration::from_secs(30))));
    let mut rg = resource_group();

    h.reconciler.create_or_update(&mut rg).await.unwrap();
    let result = h.reconciler.create_or_update(&mut rg).await.unwrap();

    assert_eq!(result, ReconcileResult::requeue_after(Duration::from_secs(30)));
    assert_eq!(h.arm.calls().len(), 2);
    assert!(h.arm.calls()[1].starts_with("POLL "));
    assert!(annotations::get_resume_token(&rg).is_some());
    assert_eq!(ready_reason(rg.conditions()), Some(reasons::RECONCILING));
}

#[tokio::test]
async fn test_monitor_completion_refreshes_status_and_succeeds() {
    let h = rg_harness();
    h.arm.on_put(Ok(in_progress(PollerKind::CreateOrUpdate, &resource_group_id())));
    h.arm.on_poll(PollStep::Done);
    h.arm.on_get(Ok(json!({
        "id": resource_group_id(),
        "name": "app-rg",
        "location": "westeurope",
        "properties": { "provisioningState": "Succeeded" }
    })));
    let mut rg = resource_group();

    h.reconciler.create_or_update(&mut rg).await.unwrap();
    let result = h.reconciler.create_or_update(&mut rg).await.unwrap();

    assert!(result.is_done());
    assert_eq!(
        h.arm.calls().last().cloned(),
        Some(format!("GET {}", resource_group_id()))
    );
    assert!(annotations::get_resume_token(&rg).is_none());
    let status = rg.status.as_ref().unwrap();
    assert_eq!(status.id.as_deref(), Some(resource_group_id().as_str()));
    assert_eq!(status.provisioning_state.as_deref(), Some("Succeeded"));

    let condition = ready(&rg);
    assert_eq!(condition.status, ConditionStatus::True);
    assert_eq!(condition.reason(), Some(reasons::SUCCEEDED));
    assert_eq!(condition.observed_generation, 1);
}

#[tokio::test]
async fn test_synchronous_create_succeeds_in_one_pass() {
    let h = rg_harness();
    h.arm.on_put(Ok(completed(PollerKind::CreateOrUpdate, &resource_group_id())));
    let mut rg = resource_group();

    let result = h.reconciler.create_or_update(&mut rg).await.unwrap();

    assert!(result.is_done());
    assert_eq!(
        h.arm.calls(),
        vec![
            format!("PUT {}", resource_group_id()),
            format!("GET {}", resource_group_id()),
        ]
    );
    assert!(annotations::get_resume_token(&rg).is_none());
    assert_eq!(ready_reason(rg.conditions()), Some(reasons::SUCCEEDED));
}

#[tokio::test]
async fn test_fatal_put_error_clears_token_and_reports_error() {
    let h = rg_harness();
    h.arm.on_put(Err(CloudError::new(
        Some(400),
        "BadRequest",
        "location is not valid",
    )));
    let mut rg = resource_group();

    let err = h.reconciler.create_or_update(&mut rg).await.unwrap_err();

    let ready_err = err.to_ready_error().unwrap();
    assert_eq!(ready_err.severity, ConditionSeverity::Error);
    assert_eq!(ready_err.reason, "BadRequest");
    assert_eq!(ready_err.retry, RetryClassification::None);
    assert_eq!(err.classification(), "fatal");
    assert!(annotations::get_resume_token(&rg).is_none());
}

#[tokio::test]
async fn test_deleting_condition_blocks_create_without_remote_calls() {
    let h = rg_harness();
    let mut rg = resource_group();
    set_condition(rg.conditions_mut(), Condition::ready_deleting(1));

    let err = h.reconciler.create_or_update(&mut rg).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::CurrentlyDeleting));
    assert!(h.arm.calls().is_empty());
}

#[tokio::test]
async fn test_generation_change_during_create_requeues_after_success() {
    let h = rg_harness();
    h.arm.on_put(Ok(in_progress(PollerKind::CreateOrUpdate, &resource_group_id())));
    h.arm.on_poll(PollStep::Done);
    let mut rg = resource_group();

    h.reconciler.create_or_update(&mut rg).await.unwrap();
    rg.metadata.generation = Some(2);
    let result = h.reconciler.create_or_update(&mut rg).await.unwrap();

    assert_eq!(result, ReconcileResult::requeue());
    assert!(annotations::get_resume_token(&rg).is_none());
    assert_eq!(ready_reason(rg.conditions()), Some(reasons::SUCCEEDED));
    // The next pass sends the new spec
    assert_eq!(annotation(&rg, LATEST_RECONCILED_GENERATION_ANNOTATION), Some("1"));
}

#[tokio::test]
async fn test_failed_operation_for_old_generation_requeues() {
    let h = rg_harness();
    h.arm.on_put(Ok(in_progress(PollerKind::CreateOrUpdate, &resource_group_id())));
    h.arm.on_poll(PollStep::Fail(CloudError::new(
        Some(400),
        "InvalidResourceGroupLocation",
        "cannot move resource group",
    )));
    let mut rg = resource_group();

    h.reconciler.create_or_update(&mut rg).await.unwrap();
    rg.metadata.generation = Some(2);
    let result = h.reconciler.create_or_update(&mut rg).await.unwrap();

    assert_eq!(result, ReconcileResult::requeue());
    assert!(annotations::get_resume_token(&rg).is_none());
    let condition = ready(&rg);
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason(), Some("InvalidResourceGroupLocation"));
}

#[tokio::test]
async fn test_failed_operation_for_current_generation_is_an_error() {
    let h = rg_harness();
    h.arm.on_put(Ok(in_progress(PollerKind::CreateOrUpdate, &resource_group_id())));
    h.arm.on_poll(PollStep::Fail(CloudError::new(Some(409), "Conflict", "busy")));
    let mut rg = resource_group();

    h.reconciler.create_or_update(&mut rg).await.unwrap();
    let err = h.reconciler.create_or_update(&mut rg).await.unwrap_err();

    assert_eq!(err.retry(), RetryClassification::Fast);
    assert!(annotations::get_resume_token(&rg).is_none());
}

#[tokio::test]
async fn test_subscription_mismatch_is_fatal() {
    let h = rg_harness();
    let mut rg = resource_group();
    annotations::set_resource_id(
        &mut rg,
        "/subscriptions/99999999-0000-0000-0000-000000000000/resourceGroups/app-rg",
    );

    let err = h.reconciler.create_or_update(&mut rg).await.unwrap_err();

    let ready_err = err.to_ready_error().unwrap();
    assert_eq!(ready_err.reason, reasons::SUBSCRIPTION_MISMATCH);
    assert!(ready_err.is_fatal());
    assert!(h.arm.calls().is_empty());
}

#[tokio::test]
async fn test_missing_azure_name_is_fatal() {
    let h = rg_harness();
    let mut rg = resource_group();
    rg.spec.azure_name.clear();

    let err = h.reconciler.create_or_update(&mut rg).await.unwrap_err();

    assert_eq!(
        err.to_ready_error().map(|e| e.reason),
        Some(reasons::AZURE_NAME_NOT_SET.to_string())
    );
}

#[tokio::test]
async fn test_delete_async_then_monitor_with_retry_after() {
    let h = rg_harness();
    h.arm.on_delete(Ok(in_progress(PollerKind::Delete, &resource_group_id())));
    h.arm.on_poll(PollStep::InProgress(Some(Duration::from_secs(30))));
    h.arm.on_poll(PollStep::Done);
    let mut rg = resource_group();
    annotations::set_resource_id(&mut rg, &resource_group_id());

    let started = h.reconciler.delete(&mut rg).await.unwrap();
    assert_eq!(started, ReconcileResult::requeue());
    assert_eq!(
        annotations::get_resume_token(&rg).map(|t| t.poller_id),
        Some(DELETE_POLLER_ID.to_string())
    );
    assert_eq!(ready_reason(rg.conditions()), Some(reasons::DELETING));

    let polling = h.reconciler.delete(&mut rg).await.unwrap();
    assert_eq!(polling, ReconcileResult::requeue_after(Duration::from_secs(30)));

    let finished = h.reconciler.delete(&mut rg).await.unwrap();
    assert!(finished.is_done());
    assert!(annotations::get_resume_token(&rg).is_none());
    assert_eq!(h.arm.calls().len(), 3);
}

#[tokio::test]
async fn test_delete_of_missing_resource_succeeds() {
    let h = rg_harness();
    h.arm.on_delete(Err(CloudError::new(
        Some(404),
        "ResourceGroupNotFound",
        "gone",
    )));
    let mut rg = resource_group();
    annotations::set_resource_id(&mut rg, &resource_group_id());

    let result = h.reconciler.delete(&mut rg).await.unwrap();

    assert!(result.is_done());
}

#[tokio::test]
async fn test_delete_without_resource_id_makes_no_calls() {
    let h = rg_harness();
    let mut rg = resource_group();

    let result = h.reconciler.delete(&mut rg).await.unwrap();

    assert!(result.is_done());
    assert!(h.arm.calls().is_empty());
}

#[tokio::test]
async fn test_delete_token_wins_over_create_token_on_delete() {
    let h = rg_harness();
    h.arm.on_delete(Ok(completed(PollerKind::Delete, &resource_group_id())));
    let mut rg = resource_group();
    annotations::set_resource_id(&mut rg, &resource_group_id());
    let create = in_progress(PollerKind::CreateOrUpdate, &resource_group_id());
    annotations::set_resume_token(&mut rg, CREATE_POLLER_ID, &create.resume_token());

    // A create token does not count as a delete in flight
    let result = h.reconciler.delete(&mut rg).await.unwrap();

    assert!(result.is_done());
    assert_eq!(h.arm.calls(), vec![format!("DELETE {}", resource_group_id())]);
    assert!(annotations::get_resume_token(&rg).is_none());
}

#[tokio::test]
async fn test_storage_account_waits_for_owner_id() {
    let h: Harness<StorageAccount> =
        harness(Arc::new(StorageAccountExtension), FakeResolver::with_owner(None));
    let mut sa = storage_account();

    let err = h.reconciler.create_or_update(&mut sa).await.unwrap_err();

    let ready_err = err.to_ready_error().unwrap();
    assert_eq!(ready_err.reason, reasons::WAITING_FOR_OWNER);
    assert_eq!(ready_err.severity, ConditionSeverity::Warning);
    assert!(h.arm.calls().is_empty());
}

#[tokio::test]
async fn test_storage_account_exports_keys_after_create() {
    let h: Harness<StorageAccount> = harness(
        Arc::new(StorageAccountExtension),
        FakeResolver::with_owner(Some(&resource_group_id())),
    );
    h.arm.on_put(Ok(completed(PollerKind::CreateOrUpdate, &storage_account_id())));
    h.arm.on_action(Ok(json!({"keys": [
        {"keyName": "key1", "value": "primary-key", "permissions": "FULL"},
        {"keyName": "key2", "value": "secondary-key", "permissions": "FULL"}
    ]})));
    let mut sa = storage_account();
    sa.spec.operator_spec = Some(StorageAccountOperatorSpec {
        secrets: Some(StorageAccountOperatorSecrets {
            key1: Some(SecretDestination {
                name: "app-storage-keys".to_string(),
                key: "primary".to_string(),
            }),
            key2: None,
        }),
        ..Default::default()
    });

    let result = h.reconciler.create_or_update(&mut sa).await.unwrap();

    assert!(result.is_done());
    assert_eq!(
        h.arm.calls(),
        vec![
            format!("PUT {}", storage_account_id()),
            format!("GET {}", storage_account_id()),
            format!("POST {}/listKeys", storage_account_id()),
        ]
    );
    let applied = h.applier.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].kind, ExportKind::Secret);
    assert_eq!(applied[0].name, "app-storage-keys");
    assert_eq!(
        applied[0].data.get("primary").map(String::as_str),
        Some("primary-key")
    );
    assert_eq!(ready_reason(sa.conditions()), Some(reasons::SUCCEEDED));
}

#[tokio::test]
async fn test_storage_account_not_settled_until_provisioned() {
    let h: Harness<StorageAccount> = harness(
        Arc::new(StorageAccountExtension),
        FakeResolver::with_owner(Some(&resource_group_id())),
    );
    h.arm.on_put(Ok(completed(PollerKind::CreateOrUpdate, &storage_account_id())));
    h.arm.on_get(Ok(json!({
        "id": storage_account_id(),
        "properties": { "provisioningState": "ResolvingDNS" }
    })));
    let mut sa = storage_account();

    let err = h.reconciler.create_or_update(&mut sa).await.unwrap_err();

    assert_eq!(
        err.to_ready_error().map(|e| e.reason),
        Some(reasons::POST_RECONCILIATION_CHECK_FAILED.to_string())
    );
    assert!(h.applier.applied().is_empty());
    assert!(annotations::get_resume_token(&sa).is_none());
}

#[tokio::test]
async fn test_update_status_refreshes_without_writing() {
    let h = rg_harness();
    h.arm.on_get(Ok(json!({
        "id": resource_group_id(),
        "location": "westeurope",
        "tags": {"env": "dev"}
    })));
    let mut rg = resource_group();
    annotations::set_resource_id(&mut rg, &resource_group_id());

    let refreshed = h.reconciler.update_status(&mut rg).await.unwrap();

    assert!(refreshed);
    assert_eq!(h.arm.calls(), vec![format!("GET {}", resource_group_id())]);
    let status = rg.status.as_ref().unwrap();
    assert_eq!(status.tags.get("env").map(String::as_str), Some("dev"));
}

#[tokio::test]
async fn test_update_status_reports_missing_resource() {
    let h = rg_harness();
    h.arm.on_get(Err(CloudError::new(Some(404), "ResourceGroupNotFound", "gone")));
    let mut rg = resource_group();
    annotations::set_resource_id(&mut rg, &resource_group_id());

    let err = h.reconciler.update_status(&mut rg).await.unwrap_err();

    assert_eq!(
        err.to_ready_error().map(|e| e.reason),
        Some(reasons::AZURE_RESOURCE_NOT_FOUND.to_string())
    );
}

#[tokio::test]
async fn test_claim_adds_finalizer_owner_and_condition() {
    let h: Harness<StorageAccount> = harness(
        Arc::new(StorageAccountExtension),
        FakeResolver::with_owner(Some(&resource_group_id())),
    );
    let mut sa = storage_account();

    h.reconciler.claim(&mut sa).await.unwrap();
    h.reconciler.claim(&mut sa).await.unwrap();

    assert_eq!(
        sa.meta().finalizers.clone().unwrap_or_default(),
        vec![arm_resource_controller::constants::FINALIZER_NAME.to_string()]
    );
    let owners = sa.meta().owner_references.clone().unwrap_or_default();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].uid, "rg-uid");
    assert_eq!(ready_reason(sa.conditions()), Some(reasons::RECONCILING));
}

#[tokio::test]
async fn test_update_status_without_resource_id_refreshes_nothing() {
    let h = rg_harness();
    let mut rg = resource_group();

    let refreshed = h.reconciler.update_status(&mut rg).await.unwrap();

    assert!(!refreshed);
    assert!(h.arm.calls().is_empty());
    assert!(find_condition(rg.conditions(), READY_CONDITION_TYPE).is_none());
}

#[tokio::test]
async fn test_failed_settle_for_old_generation_requeues() {
    let h = rg_harness();
    h.arm.on_put(Ok(in_progress(PollerKind::CreateOrUpdate, &resource_group_id())));
    h.arm.on_poll(PollStep::Done);
    h.arm.on_get(Err(CloudError::new(Some(400), "BadRequest", "bad api-version")));
    let mut rg = resource_group();

    h.reconciler.create_or_update(&mut rg).await.unwrap();
    rg.metadata.generation = Some(2);
    let result = h.reconciler.create_or_update(&mut rg).await.unwrap();

    // A fatal failure for generation 1 must not park generation 2
    assert_eq!(result, ReconcileResult::requeue());
    assert!(annotations::get_resume_token(&rg).is_none());
    let condition = ready(&rg);
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason(), Some("BadRequest"));
}

#[tokio::test]
async fn test_missing_resource_after_create_clears_token() {
    let h = rg_harness();
    h.arm.on_put(Ok(in_progress(PollerKind::CreateOrUpdate, &resource_group_id())));
    h.arm.on_poll(PollStep::Done);
    h.arm.on_get(Err(CloudError::new(Some(404), "ResourceGroupNotFound", "gone")));
    let mut rg = resource_group();

    h.reconciler.create_or_update(&mut rg).await.unwrap();
    let err = h.reconciler.create_or_update(&mut rg).await.unwrap_err();

    let ready_err = err.to_ready_error().unwrap();
    assert_eq!(ready_err.reason, "ResourceGroupNotFound");
    assert_eq!(ready_err.severity, ConditionSeverity::Warning);
    assert!(annotations::get_resume_token(&rg).is_none());
}

#[tokio::test]
async fn test_pre_check_postpone_returns_without_put() {
    let h: Harness<ResourceGroup> = harness(
        Arc::new(ScriptedExtension::with_pre_check(PreReconcileCheckResult::Postpone)),
        FakeResolver::default(),
    );
    let mut rg = resource_group();

    let result = h.reconciler.create_or_update(&mut rg).await.unwrap();

    assert_eq!(result, ReconcileResult::done());
    assert!(h.arm.calls().is_empty());
    assert!(annotations::get_resume_token(&rg).is_none());
}

#[tokio::test]
async fn test_pre_check_block_surfaces_its_error() {
    let h: Harness<ResourceGroup> = harness(
        Arc::new(ScriptedExtension::with_pre_check(PreReconcileCheckResult::Block(
            ReadyConditionImpactingError::warning("QuotaExceeded", "no cores left in westeurope"),
        ))),
        FakeResolver::default(),
    );
    let mut rg = resource_group();

    let err = h.reconciler.create_or_update(&mut rg).await.unwrap_err();

    assert_eq!(
        err.to_ready_error().map(|e| e.reason),
        Some("QuotaExceeded".to_string())
    );
    assert!(h.arm.calls().is_empty());
}

#[tokio::test]
async fn test_failed_secret_write_is_an_error_condition() {
    let h: Harness<StorageAccount> = harness(
        Arc::new(StorageAccountExtension),
        FakeResolver::with_owner(Some(&resource_group_id())),
    );
    h.arm.on_put(Ok(completed(PollerKind::CreateOrUpdate, &storage_account_id())));
    h.arm.on_action(Ok(json!({"keys": [
        {"keyName": "key1", "value": "primary-key", "permissions": "FULL"}
    ]})));
    h.applier.fail_applies();
    let mut sa = storage_account();
    sa.spec.operator_spec = Some(StorageAccountOperatorSpec {
        secrets: Some(StorageAccountOperatorSecrets {
            key1: Some(SecretDestination {
                name: "app-storage-keys".to_string(),
                key: "primary".to_string(),
            }),
            key2: None,
        }),
        ..Default::default()
    });

    let err = h.reconciler.create_or_update(&mut sa).await.unwrap_err();

    let ready_err = err.to_ready_error().unwrap();
    assert_eq!(ready_err.reason, reasons::ADDITIONAL_KUBERNETES_OBJ_WRITE_FAILURE);
    assert_eq!(ready_err.severity, ConditionSeverity::Error);
    assert!(h.applier.applied().is_empty());
    assert!(annotations::get_resume_token(&sa).is_none());
}

#[tokio::test]
async fn test_delete_token_on_create_is_a_local_error() {
    let h = rg_harness();
    let mut rg = resource_group();
    let delete = in_progress(PollerKind::Delete, &resource_group_id());
    annotations::set_resume_token(&mut rg, DELETE_POLLER_ID, &delete.resume_token());

    let err = h.reconciler.create_or_update(&mut rg).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::UnexpectedPoller { .. }));
    assert!(err.ready_error().is_none());
    assert!(h.arm.calls().is_empty());
}

#[tokio::test]
async fn test_custom_deleter_replaces_direct_delete() {
    let extension = Arc::new(ScriptedExtension::with_deleter(Ok(completed(
        PollerKind::Delete,
        &resource_group_id(),
    ))));
    let h: Harness<ResourceGroup> = harness(
        Arc::clone(&extension) as Arc<dyn ResourceExtension<ResourceGroup>>,
        FakeResolver::default(),
    );
    let mut rg = resource_group();
    annotations::set_resource_id(&mut rg, &resource_group_id());

    let result = h.reconciler.delete(&mut rg).await.unwrap();

    assert!(result.is_done());
    assert!(h.arm.calls().is_empty());
    assert_eq!(extension.deleted(), vec![resource_group_id()]);
}

/// A kind whose ARM API has no GET, only HEAD
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Vault",
    group = "test.azure.com",
    version = "v1",
    namespaced,
    status = "VaultStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VaultSpec {
    pub azure_name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
pub struct VaultStatus {
    pub id: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ArmResource for Vault {
    const RESOURCE_TYPE: &'static str = "Microsoft.Test/vaults";
    const API_VERSION: &'static str = "2024-01-01";

    fn azure_name(&self) -> &str {
        &self.spec.azure_name
    }

    fn resource_id(&self, subscription_id: &str, _owner: Option<&ArmId>) -> Option<ArmId> {
        Some(
            ArmId::for_resource_group(subscription_id, "app-rg")
                .child(Self::RESOURCE_TYPE, &self.spec.azure_name),
        )
    }

    fn to_arm(&self) -> Value {
        json!({})
    }

    fn set_arm_status(&mut self, body: &Value) {
        self.status.get_or_insert_with(VaultStatus::default).id =
            body.get("id").and_then(Value::as_str).map(str::to_string);
    }

    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status.get_or_insert_with(VaultStatus::default).conditions
    }

    fn supports_get(&self) -> bool {
        false
    }
}

fn vault() -> Vault {
    let mut vault = Vault::new(
        "app-vault",
        VaultSpec {
            azure_name: "appvault".to_string(),
        },
    );
    vault.metadata.namespace = Some(NAMESPACE.to_string());
    vault.metadata.uid = Some("vault-uid".to_string());
    vault.metadata.generation = Some(1);
    vault
}

fn vault_id() -> String {
    format!("{}/providers/Microsoft.Test/vaults/appvault", resource_group_id())
}

#[tokio::test]
async fn test_status_refresh_uses_head_without_get() {
    let h: Harness<Vault> = harness(Arc::new(NoExtension), FakeResolver::default());
    h.arm.on_put(Ok(completed(PollerKind::CreateOrUpdate, &vault_id())));
    let mut vault = vault();

    let result = h.reconciler.create_or_update(&mut vault).await.unwrap();

    assert!(result.is_done());
    assert_eq!(
        h.arm.calls(),
        vec![format!("PUT {}", vault_id()), format!("HEAD {}", vault_id())]
    );
    assert_eq!(
        vault.status.as_ref().and_then(|s| s.id.as_deref()),
        Some(vault_id().as_str())
    );
    assert_eq!(ready_reason(vault.conditions()), Some(reasons::SUCCEEDED));
}

#[tokio::test]
async fn test_head_reporting_missing_resource_fails_create() {
    let h: Harness<Vault> = harness(Arc::new(NoExtension), FakeResolver::default());
    h.arm.on_put(Ok(completed(PollerKind::CreateOrUpdate, &vault_id())));
    h.arm.on_exists(false);
    let mut vault = vault();

    let err = h.reconciler.create_or_update(&mut vault).await.unwrap_err();

    assert_eq!(
        err.to_ready_error().map(|e| e.reason),
        Some("ResourceNotFound".to_string())
    );
    assert!(annotations::get_resume_token(&vault).is_none());
}
