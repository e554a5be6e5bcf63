//! Failure metrics and the `/metrics` endpoint.
//!
//! The reconciler reports through the [`MetricsSink`] trait it is handed at
//! construction. [`PrometheusMetrics`] is the production sink; it owns its own
//! registry and is served over HTTP next to a liveness probe.

use crate::error::ControllerError;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Collector kind reported by `mnmo_collector_up`.
pub const COLLECTOR_KIND: &str = "machineset";

/// Labels attached to a failed update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureLabels<'a> {
    /// Name of the object that could not be read or written
    pub name: &'a str,
    /// Its namespace, empty for cluster-scoped Nodes
    pub namespace: &'a str,
    pub reason: &'a str,
}

/// Where the reconciler reports failures. Calls must not block.
pub trait MetricsSink: Send + Sync {
    fn label_update_failed(&self, labels: &FailureLabels<'_>);
    fn taint_update_failed(&self, labels: &FailureLabels<'_>);
}

/// Prometheus-backed [`MetricsSink`].
#[derive(Debug, Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    label_update_failed: IntCounterVec,
    taint_update_failed: IntCounterVec,
    collector_up: IntGaugeVec,
}

impl PrometheusMetrics {
    /// Create the collectors and register them with `registry`.
    pub fn new(registry: Registry) -> Result<Self, ControllerError> {
        let failure_labels = &["name", "namespace", "reason"];

        let label_update_failed = IntCounterVec::new(
            Opts::new("mnmo_label_update_failed", "Number of times label update has failed."),
            failure_labels,
        )?;
        let taint_update_failed = IntCounterVec::new(
            Opts::new("mnmo_taint_update_failed", "Number of times taint update has failed."),
            failure_labels,
        )?;
        let collector_up = IntGaugeVec::new(
            Opts::new(
                "mnmo_collector_up",
                "Managed node metadata operator metrics are being collected and reported successfully",
            ),
            &["kind"],
        )?;

        registry.register(Box::new(label_update_failed.clone()))?;
        registry.register(Box::new(taint_update_failed.clone()))?;
        registry.register(Box::new(collector_up.clone()))?;

        Ok(Self {
            registry,
            label_update_failed,
            taint_update_failed,
            collector_up,
        })
    }

    pub fn set_collector_up(&self, kind: &str, up: bool) {
        self.collector_up.with_label_values(&[kind]).set(i64::from(up));
    }

    /// Current values in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, ControllerError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ControllerError::Metrics(e.to_string()))
    }
}

impl MetricsSink for PrometheusMetrics {
    fn label_update_failed(&self, labels: &FailureLabels<'_>) {
        self.label_update_failed
            .with_label_values(&[labels.name, labels.namespace, labels.reason])
            .inc();
    }

    fn taint_update_failed(&self, labels: &FailureLabels<'_>) {
        self.taint_update_failed
            .with_label_values(&[labels.name, labels.namespace, labels.reason])
            .inc();
    }
}

/// Routes for the metrics listener.
pub fn metrics_routes(metrics: Arc<PrometheusMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<Arc<PrometheusMetrics>>) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                e.to_string(),
            )
        }
    }
}

/// Bind `addr` and serve metrics until `cancel` fires.
pub async fn serve(
    addr: SocketAddr,
    metrics: Arc<PrometheusMetrics>,
    cancel: CancellationToken,
) -> Result<(), ControllerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Metrics(format!("failed to bind {}: {}", addr, e)))?;
    info!(addr = %addr, "Metrics server started");
    serve_on(listener, metrics, cancel).await
}

/// Serve metrics on an already bound listener until `cancel` fires.
pub async fn serve_on(
    listener: TcpListener,
    metrics: Arc<PrometheusMetrics>,
    cancel: CancellationToken,
) -> Result<(), ControllerError> {
    metrics.set_collector_up(COLLECTOR_KIND, true);
    let result = axum::serve(listener, metrics_routes(metrics.clone()))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| ControllerError::Metrics(format!("metrics server error: {}", e)));
    metrics.set_collector_up(COLLECTOR_KIND, false);
    info!("Metrics server stopped");
    result
}
