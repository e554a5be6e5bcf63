//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the store, the
//! metrics sink and the reconciler together, and runs the MachineSet watcher
//! next to the metrics server until shutdown.

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::metrics::{self, PrometheusMetrics};
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use cluster_store::KubeStore;
use crds::{Machine, MachineSet};
use kube::Api;
use prometheus::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Main controller for node metadata management.
pub struct Controller {
    machine_set_watcher: JoinHandle<Result<(), ControllerError>>,
    metrics_server: JoinHandle<Result<(), ControllerError>>,
    cancel: CancellationToken,
}

impl Controller {
    /// Creates a new controller instance and starts its background tasks.
    pub async fn new(config: OperatorConfig) -> Result<Self, ControllerError> {
        info!("Initializing node metadata controller");

        let store = KubeStore::try_default().await?;
        let client = store.client();

        let metrics = Arc::new(PrometheusMetrics::new(Registry::new())?);
        let reconciler = Arc::new(Reconciler::new(
            store,
            metrics.clone(),
            config.backoff_min_seconds,
            config.backoff_max_seconds,
        ));

        let cancel = CancellationToken::new();
        spawn_signal_handler(cancel.clone());

        let machine_set_api: Api<MachineSet> = Api::namespaced(client.clone(), &config.namespace);
        let machine_api: Api<Machine> = Api::namespaced(client, &config.namespace);
        let watcher = Watcher::new(
            reconciler,
            machine_set_api,
            machine_api,
            config.reconcile_concurrency,
            Duration::from_secs(config.resync_interval_seconds),
            cancel.clone(),
        );

        let machine_set_watcher = tokio::spawn(async move { watcher.watch_machine_sets().await });

        let metrics_server = {
            let cancel = cancel.clone();
            let addr = config.metrics_bind_address;
            tokio::spawn(async move { metrics::serve(addr, metrics, cancel).await })
        };

        Ok(Self {
            machine_set_watcher,
            metrics_server,
            cancel,
        })
    }

    /// Runs the controller until shutdown.
    ///
    /// Returns when either task exits; the other is asked to stop through the
    /// shared cancellation token.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Node metadata controller running");

        let result = tokio::select! {
            result = &mut self.machine_set_watcher => {
                flatten(result, "MachineSet watcher")
            }
            result = &mut self.metrics_server => {
                flatten(result, "Metrics server")
            }
        };

        self.cancel.cancel();
        if let Err(e) = &result {
            error!("Shutting down: {}", e);
        }
        result
    }
}

fn flatten(
    joined: Result<Result<(), ControllerError>, tokio::task::JoinError>,
    task: &str,
) -> Result<(), ControllerError> {
    joined
        .map_err(|e| ControllerError::Watch(format!("{} panicked: {}", task, e)))?
        .map_err(|e| ControllerError::Watch(format!("{} error: {}", task, e)))
}

/// Cancel `cancel` on Ctrl-C.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        cancel.cancel();
    });
}
