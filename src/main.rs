//! # ARM Resource Controller
//!
//! Kubernetes controller that creates, updates and deletes Azure Resource
//! Manager resources declared as custom resources (`ResourceGroup`,
//! `StorageAccount`).
//!
//! Exposes `/metrics`, `/healthz` and `/readyz` on the configured port.

use anyhow::Result;
use arm_resource_controller::runtime::{initialize, run_watch_loop, spawn_shutdown_handler};
use kube::Api;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    spawn_shutdown_handler(Arc::clone(&init.server_state));

    let resource_groups = run_watch_loop(
        Api::all(init.client.clone()),
        Arc::clone(&init.resource_groups),
        Arc::clone(&init.server_state),
        Arc::clone(&init.config),
    );
    let storage_accounts = run_watch_loop(
        Api::all(init.client.clone()),
        Arc::clone(&init.storage_accounts),
        Arc::clone(&init.server_state),
        Arc::clone(&init.config),
    );

    let (rg, sa) = tokio::join!(resource_groups, storage_accounts);
    rg?;
    sa?;

    info!("Controller stopped");
    Ok(())
}
