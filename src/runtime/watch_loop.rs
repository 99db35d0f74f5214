//! # Watch Loop
//!
//! One `kube_runtime::Controller` per managed kind. Each loop restarts its
//! watch when the stream ends and exits once shutdown has been requested.

use crate::config::SharedControllerConfig;
use crate::controller::reconciler::{ControllerContext, reconcile};
use crate::controller::server::ServerState;
use crate::crd::ArmResource;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::{Controller, controller, watcher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Instrument, debug, info, warn};

/// Mark the server as not ready on SIGINT/SIGTERM so the loops wind down
pub fn spawn_shutdown_handler(server_state: Arc<ServerState>) {
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        server_state.set_ready(false);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });
}

/// Run the watch loop for kind `K` until shutdown
///
/// # Errors
/// Currently never fails; the stream is restarted on every error.
pub async fn run_watch_loop<K: ArmResource>(
    api: Api<K>,
    ctx: Arc<ControllerContext<K>>,
    server_state: Arc<ServerState>,
    config: SharedControllerConfig,
) -> Result<(), anyhow::Error> {
    let kind = K::kind(&()).to_string();
    let backoff_duration_ms = Arc::new(AtomicU64::new(config.watch_backoff_start_ms));
    let concurrency = config.max_concurrent_reconciliations;

    loop {
        if !server_state.is_ready() {
            info!("Shutdown requested, exiting {} watch loop", kind);
            break;
        }

        let watch_span = tracing::info_span!(
            "controller.watch",
            resource.kind = kind.as_str(),
            operation = "watch_loop"
        );

        info!("Starting {} watch loop...", kind);
        let backoff = Arc::clone(&backoff_duration_ms);
        let filter_config = Arc::clone(&config);
        let filter_kind = kind.clone();
        let controller_future = Controller::new(api.clone(), watcher::Config::default().any_semantic())
            .with_config(controller::Config::default().concurrency(concurrency))
            .shutdown_on_signal()
            .run(
                reconcile::<K>,
                handle_reconciliation_error::<K>,
                Arc::clone(&ctx),
            )
            .filter_map(move |x| {
                let backoff = Arc::clone(&backoff);
                let config = Arc::clone(&filter_config);
                let kind = filter_kind.clone();
                async move {
                    match x {
                        Ok((obj, action)) => {
                            backoff.store(config.watch_backoff_start_ms, Ordering::Relaxed);
                            debug!(resource.name = obj.name.as_str(), action = ?action, "watch.event.reconciled");
                            Some(Ok((obj, action)))
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            handle_watch_stream_error(
                                &kind,
                                &error_string,
                                &backoff,
                                config.watch_backoff_max_ms,
                                config.watch_restart_delay_secs,
                            )
                            .await
                            .map(|()| Err(e))
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()));

        controller_future.instrument(watch_span).await;

        if !server_state.is_ready() {
            info!("Shutdown requested, exiting {} watch loop", kind);
            break;
        }

        warn!(
            "{} watch stream ended, restarting in {} seconds...",
            kind, config.watch_restart_delay_after_end_secs
        );
        tokio::time::sleep(config.watch_restart_delay_after_end_duration()).await;
    }

    info!("{} controller stopped gracefully", kind);
    Ok(())
}
