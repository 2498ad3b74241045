//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Source chain head and checkpoint progress
//! - Transfers seen, submitted and skipped
//! - Multisig confirmations
//! - Cycle outcomes and duration

use crate::checkpoint::CheckpointName;
use crate::error::{FederatorError, FederatorResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram, CounterVec,
    Encoder, Gauge, GaugeVec, Histogram, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Chain metrics
    pub static ref SOURCE_HEAD: Gauge = register_gauge!(
        "federator_source_head_block",
        "Latest mainchain block height observed"
    ).unwrap();

    pub static ref CHECKPOINT: GaugeVec = register_gauge_vec!(
        "federator_checkpoint",
        "Persisted checkpoint values",
        &["name"]
    ).unwrap();

    // Transfer metrics
    pub static ref TRANSFERS: CounterVec = register_counter_vec!(
        "federator_transfers_total",
        "Cross events handled, by outcome",
        &["outcome"]
    ).unwrap();

    // Multisig metrics
    pub static ref CONFIRMATIONS: CounterVec = register_counter_vec!(
        "federator_confirmations_total",
        "Pending multisig proposals handled, by outcome",
        &["outcome"]
    ).unwrap();

    // Cycle metrics
    pub static ref CYCLES: CounterVec = register_counter_vec!(
        "federator_cycles_total",
        "Relay cycles run, by result",
        &["result"]
    ).unwrap();

    pub static ref CYCLE_DURATION: Histogram = register_histogram!(
        "federator_cycle_duration_seconds",
        "Wall time of one relay cycle",
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
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

    pub async fn run(&self) -> FederatorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| FederatorError::Internal(format!("metrics server: {}", e)))
    }
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    render().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Text exposition of every registered metric
pub fn render() -> FederatorResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| FederatorError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| FederatorError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_source_head(block_number: u64) {
    SOURCE_HEAD.set(block_number as f64);
}

pub fn record_checkpoint(name: CheckpointName, value: u64) {
    CHECKPOINT.with_label_values(&[name.key()]).set(value as f64);
}

pub fn record_event_seen() {
    TRANSFERS.with_label_values(&["seen"]).inc();
}

pub fn record_transfer_submitted() {
    TRANSFERS.with_label_values(&["submitted"]).inc();
}

pub fn record_transfer_skipped() {
    TRANSFERS.with_label_values(&["already_processed"]).inc();
}

pub fn record_confirmation_sent() {
    CONFIRMATIONS.with_label_values(&["sent"]).inc();
}

pub fn record_confirmation_skipped() {
    CONFIRMATIONS.with_label_values(&["already_confirmed"]).inc();
}

pub fn record_cycle(success: bool, duration_secs: f64) {
    let result = if success { "ok" } else { "failed" };
    CYCLES.with_label_values(&[result]).inc();
    CYCLE_DURATION.observe(duration_secs);
}
