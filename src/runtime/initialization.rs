//! # Initialization
//!
//! Controller start-up: rustls, tracing, metrics, the HTTP server, the
//! Kubernetes client and one reconcile context per managed kind.

use crate::config::{ControllerConfig, SharedControllerConfig};
use crate::constants::CONTROLLER_NAME;
use crate::controller::events::{EventPublisher, KubeEventPublisher};
use crate::controller::reconciler::{
    ArmReconciler, ControllerContext, KubeObjectApplier, KubeReferenceResolver, NoExtension,
    ObjectApplier, ReferenceResolver, StorageAccountExtension,
};
use crate::controller::server::{ServerState, start_server};
use crate::crd::{ArmResource, ResourceGroup, StorageAccount};
use crate::identity::{ConnectionCache, GenericClientFactory, KubeCredentialProvider};
use crate::observability;
use anyhow::{Result, anyhow};
use kube::api::ListParams;
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const SERVER_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const SERVER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Everything the watch loops need
pub struct InitializationResult {
    pub client: Client,
    pub server_state: Arc<ServerState>,
    pub config: SharedControllerConfig,
    pub resource_groups: Arc<ControllerContext<ResourceGroup>>,
    pub storage_accounts: Arc<ControllerContext<StorageAccount>>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// # Errors
/// Fails when logging or metrics can not be installed, the HTTP server does
/// not come up, or no Kubernetes client can be built.
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before anything opens a TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    let config: SharedControllerConfig = Arc::new(ControllerConfig::from_env());
    observability::logging::init_logging(&config)?;

    info!("Starting ARM Resource Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_port = config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default().await?;

    let connections = Arc::new(ConnectionCache::new(
        Arc::new(KubeCredentialProvider::new(client.clone(), &config)),
        Arc::new(GenericClientFactory::new(
            config.arm_endpoint.clone(),
            config.arm_http_timeout(),
        )),
    ));
    let resolver: Arc<dyn ReferenceResolver> = Arc::new(KubeReferenceResolver::new(client.clone()));
    let applier: Arc<dyn ObjectApplier> = Arc::new(KubeObjectApplier::new(client.clone()));
    let events: Arc<dyn EventPublisher> =
        Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME));

    let resource_groups: Arc<ControllerContext<ResourceGroup>> = Arc::new(ControllerContext::new(
        client.clone(),
        ArmReconciler::new(
            Arc::clone(&connections),
            Arc::new(NoExtension),
            Arc::clone(&resolver),
            Arc::clone(&applier),
            Arc::clone(&events),
        ),
        (*config).clone(),
    ));
    let storage_accounts: Arc<ControllerContext<StorageAccount>> = Arc::new(ControllerContext::new(
        client.clone(),
        ArmReconciler::new(
            connections,
            Arc::new(StorageAccountExtension),
            resolver,
            applier,
            events,
        ),
        (*config).clone(),
    ));

    summarize_existing_resources::<ResourceGroup>(&client).await;
    summarize_existing_resources::<StorageAccount>(&client).await;

    info!("Controller initialized, starting watch loops...");

    Ok(InitializationResult {
        client,
        server_state,
        config,
        resource_groups,
        storage_accounts,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > SERVER_STARTUP_TIMEOUT {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                SERVER_STARTUP_TIMEOUT.as_secs()
            ));
        }

        tokio::time::sleep(SERVER_POLL_INTERVAL).await;
    }
}

/// Log how many objects of kind `K` exist per namespace
///
/// A failing list usually means the CRD is not installed; the watch loop
/// reports that again, so it is only a warning here.
async fn summarize_existing_resources<K: ArmResource>(client: &Client) {
    let kind = K::kind(&());
    let api: Api<K> = Api::all(client.clone());
    let list = match api.list_metadata(&ListParams::default()).await {
        Ok(list) => list,
        Err(e) => {
            warn!("Could not list existing {} resources: {}", kind, e);
            return;
        }
    };

    let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in &list.items {
        by_namespace
            .entry(item.metadata.namespace.clone().unwrap_or_default())
            .or_default()
            .push(item.metadata.name.clone().unwrap_or_default());
    }

    info!(
        "📋 Found {} existing {} resources in {} namespaces",
        list.items.len(),
        kind,
        by_namespace.len()
    );
    for (namespace, mut names) in by_namespace {
        names.sort();
        let shown = if names.len() <= 3 {
            names.join(", ")
        } else {
            format!("{}, ... ({} total)", names[..3].join(", "), names.len())
        };
        info!("  {}: {}", namespace, shown);
    }
}
