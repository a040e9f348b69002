//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports to Prometheus.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use studyhub_core::{HubStats, JoinOutcome};
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "studyhub_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "studyhub_connections_active";
    pub const FRAMES_TOTAL: &str = "studyhub_frames_total";
    pub const FRAME_BYTES: &str = "studyhub_frame_bytes";
    pub const ROOMS_ACTIVE: &str = "studyhub_rooms_active";
    pub const ONLINE_USERS: &str = "studyhub_online_users";
    pub const GROUP_JOINS_TOTAL: &str = "studyhub_group_joins_total";
    pub const DIRECT_MESSAGES_TOTAL: &str = "studyhub_direct_messages_total";
    pub const READ_RECEIPTS_TOTAL: &str = "studyhub_read_receipts_total";
    pub const FAN_OUT_RECEIVERS: &str = "studyhub_fan_out_receivers";
    pub const LATENCY_SECONDS: &str = "studyhub_frame_latency_seconds";
    pub const ERRORS_TOTAL: &str = "studyhub_errors_total";
}

/// Describe every metric.
pub fn init_metrics() {
    metrics::describe_counter!(names::CONNECTIONS_TOTAL, "Hub connections since start");
    metrics::describe_gauge!(names::CONNECTIONS_ACTIVE, "Open hub connections");
    metrics::describe_counter!(names::FRAMES_TOTAL, "Frames processed, by direction");
    metrics::describe_counter!(names::FRAME_BYTES, "Frame bytes processed, by direction");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Rooms with at least one connection");
    metrics::describe_gauge!(names::ONLINE_USERS, "Users with at least one open connection");
    metrics::describe_counter!(names::GROUP_JOINS_TOTAL, "Group room join requests, by outcome");
    metrics::describe_counter!(names::DIRECT_MESSAGES_TOTAL, "Direct messages stored and fanned out");
    metrics::describe_counter!(names::READ_RECEIPTS_TOTAL, "Read receipts sent");
    metrics::describe_histogram!(names::FAN_OUT_RECEIVERS, "Live receivers per fan-out");
    metrics::describe_histogram!(names::LATENCY_SECONDS, "Inbound frame handling latency");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Errors, by type");

    info!("Metrics initialized");
}

/// Start the Prometheus exporter.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

pub fn record_frame(bytes: usize, direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "direction" => direction).increment(1);
    counter!(names::FRAME_BYTES, "direction" => direction).increment(bytes as u64);
}

pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

pub fn record_join(outcome: JoinOutcome) {
    let outcome = match outcome {
        JoinOutcome::Joined => "joined",
        JoinOutcome::AlreadyJoined => "already_joined",
        JoinOutcome::Denied => "denied",
        JoinOutcome::Failed => "failed",
    };
    counter!(names::GROUP_JOINS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_direct_message(receivers: usize) {
    counter!(names::DIRECT_MESSAGES_TOTAL).increment(1);
    histogram!(names::FAN_OUT_RECEIVERS).record(receivers as f64);
}

pub fn record_read_receipt() {
    counter!(names::READ_RECEIPTS_TOTAL).increment(1);
}

/// Refresh the gauges derived from hub state.
pub fn record_hub_stats(stats: &HubStats) {
    gauge!(names::ROOMS_ACTIVE).set(stats.router.room_count as f64);
    gauge!(names::ONLINE_USERS).set(stats.online_users as f64);
}

pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Counts a connection while alive.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    #[must_use]
    pub fn new() -> Self {
        counter!(names::CONNECTIONS_TOTAL).increment(1);
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}
