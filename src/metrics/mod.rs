//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connectivity and block height
//! - Message lifecycle transitions
//! - Poll failures and dropped notifications
//! - Workflow starts and halts

use crate::error::{MonitorError, MonitorResult};
use crate::message::MessageState;
use crate::workflow::OperationKind;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, CounterVec, Encoder, GaugeVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{error, info};

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "interop_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain_id"]
    ).unwrap();

    pub static ref CHAIN_BLOCK_HEIGHT: GaugeVec = register_gauge_vec!(
        "interop_chain_block_height",
        "Latest block height seen per chain",
        &["chain_id"]
    ).unwrap();

    pub static ref POLL_ERRORS: CounterVec = register_counter_vec!(
        "interop_poll_errors_total",
        "Poll ticks aborted by RPC failures",
        &["chain_id"]
    ).unwrap();

    // Message metrics
    pub static ref MESSAGE_TRANSITIONS: CounterVec = register_counter_vec!(
        "interop_message_transitions_total",
        "Published message state changes by source chain",
        &["chain_id", "state"]
    ).unwrap();

    pub static ref DECODE_ERRORS: CounterVec = register_counter_vec!(
        "interop_decode_errors_total",
        "SentMessage logs skipped because they could not be decoded",
        &["chain_id"]
    ).unwrap();

    pub static ref DROPPED_NOTIFICATIONS: CounterVec = register_counter_vec!(
        "interop_dropped_notifications_total",
        "Status notifications dropped for a lagging subscriber",
        &[]
    ).unwrap();

    // Workflow metrics
    pub static ref WORKFLOWS_STARTED: CounterVec = register_counter_vec!(
        "interop_workflows_started_total",
        "Swap-bridge-swap workflows submitted",
        &[]
    ).unwrap();

    pub static ref WORKFLOWS_HALTED: CounterVec = register_counter_vec!(
        "interop_workflows_halted_total",
        "Workflows halted by operation kind",
        &["operation"]
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_CHECK_SUCCESS: CounterVec = register_counter_vec!(
        "interop_health_check_success_total",
        "Total successful health checks",
        &[]
    ).unwrap();

    pub static ref HEALTH_CHECK_FAILURE: CounterVec = register_counter_vec!(
        "interop_health_check_failure_total",
        "Total failed health checks",
        &[]
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

    pub async fn run(&self) -> MonitorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| MonitorError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| MonitorError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Text exposition of every registered metric
pub fn render() -> MonitorResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| MonitorError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| MonitorError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_block_height(chain_id: u64, block_number: u64) {
    CHAIN_BLOCK_HEIGHT
        .with_label_values(&[&chain_id.to_string()])
        .set(block_number as f64);
}

pub fn record_poll_error(chain_id: u64) {
    POLL_ERRORS
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_message_state(chain_id: u64, state: MessageState) {
    MESSAGE_TRANSITIONS
        .with_label_values(&[&chain_id.to_string(), state.as_str()])
        .inc();
}

pub fn record_decode_error(chain_id: u64) {
    DECODE_ERRORS
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_dropped_notifications(count: u64) {
    DROPPED_NOTIFICATIONS
        .with_label_values(&[])
        .inc_by(count as f64);
}

pub fn record_workflow_started() {
    WORKFLOWS_STARTED.with_label_values(&[]).inc();
}

pub fn record_workflow_halted(kind: OperationKind) {
    WORKFLOWS_HALTED
        .with_label_values(&[kind.as_str()])
        .inc();
}

pub fn record_health_check() {
    HEALTH_CHECK_SUCCESS.with_label_values(&[]).inc();
}

pub fn record_health_check_failure() {
    HEALTH_CHECK_FAILURE.with_label_values(&[]).inc();
}
