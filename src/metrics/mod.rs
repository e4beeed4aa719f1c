//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Lifecycle transitions, failures and durations
//! - Backend request latency
//! - Catalog refreshes
//! - Chain RPC health and signer submissions

use crate::error::{BridgeError, BridgeResult};
use crate::lifecycle::StateKind;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{error, info};

lazy_static! {
    // Lifecycle metrics
    pub static ref LIFECYCLE_TRANSITIONS: CounterVec = register_counter_vec!(
        "hydra_bridge_lifecycle_transitions_total",
        "Lifecycle transitions by target state",
        &["state"]
    ).unwrap();

    pub static ref LIFECYCLE_FAILURES: CounterVec = register_counter_vec!(
        "hydra_bridge_lifecycle_failures_total",
        "Failed lifecycles by error kind",
        &["kind"]
    ).unwrap();

    pub static ref LIFECYCLE_DURATION: HistogramVec = register_histogram_vec!(
        "hydra_bridge_lifecycle_duration_seconds",
        "Time from lifecycle creation to terminal state",
        &["outcome"],
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]
    ).unwrap();

    // Backend metrics
    pub static ref BACKEND_REQUESTS: HistogramVec = register_histogram_vec!(
        "hydra_bridge_backend_request_duration_seconds",
        "Bridge backend request latency",
        &["endpoint", "outcome"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    // Catalog metrics
    pub static ref CATALOG_REFRESHES: CounterVec = register_counter_vec!(
        "hydra_bridge_catalog_refreshes_total",
        "Successful catalog refreshes",
        &[]
    ).unwrap();

    pub static ref CATALOG_SIZE: GaugeVec = register_gauge_vec!(
        "hydra_bridge_catalog_entries",
        "Entries in the cached catalog",
        &["kind"]
    ).unwrap();

    // Chain metrics
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "hydra_bridge_chain_connected",
        "Chain RPC status (1=connected, 0=disconnected)",
        &["chain_id"]
    ).unwrap();

    // Signer metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "hydra_bridge_transactions_submitted_total",
        "Transactions broadcast by the wallet signer",
        &["chain_id"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> BridgeResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| BridgeError::Internal(format!("bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| BridgeError::Internal(format!("metrics server: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Current metrics in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

// Helper functions to record metrics

pub fn record_transition(state: StateKind) {
    LIFECYCLE_TRANSITIONS
        .with_label_values(&[state.as_str()])
        .inc();
}

pub fn record_failure(kind: &str) {
    LIFECYCLE_FAILURES.with_label_values(&[kind]).inc();
}

pub fn record_lifecycle_duration(outcome: StateKind, secs: f64) {
    LIFECYCLE_DURATION
        .with_label_values(&[outcome.as_str()])
        .observe(secs);
}

pub fn record_backend_request(endpoint: &str, ok: bool, secs: f64) {
    let outcome = if ok { "ok" } else { "error" };
    BACKEND_REQUESTS
        .with_label_values(&[endpoint, outcome])
        .observe(secs);
}

pub fn record_catalog_refresh(chains: usize, tokens: usize) {
    CATALOG_REFRESHES.with_label_values(&[]).inc();
    CATALOG_SIZE.with_label_values(&["chains"]).set(chains as f64);
    CATALOG_SIZE.with_label_values(&["tokens"]).set(tokens as f64);
}

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_tx_submitted(chain_id: u64) {
    TX_SUBMITTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}
