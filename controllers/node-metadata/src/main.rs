//! Node Metadata Controller
//!
//! Keeps Node labels and taints in line with the MachineSet templates that
//! provisioned them:
//! - MachineSet template labels and taints are copied onto its Machines
//! - Machine labels and taints are pushed to the backing Node
//! - Labels the operator did not write are left untouched
//!
//! Configuration comes from the environment (see `config`).

mod backoff;
mod config;
mod controller;
mod error;
mod metrics;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube is built with rustls but no default crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Node Metadata Controller");

    let config = OperatorConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace);
    info!("  Metrics address: {}", config.metrics_bind_address);
    info!("  Reconcile concurrency: {}", config.reconcile_concurrency);
    info!(
        "  Error backoff: {}s..{}s",
        config.backoff_min_seconds, config.backoff_max_seconds
    );
    info!("  Resync interval: {}s", config.resync_interval_seconds);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
