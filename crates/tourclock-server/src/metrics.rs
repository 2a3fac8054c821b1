//! Metrics collection and export for tourclock.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "tourclock_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "tourclock_connections_active";
    pub const JOINS_TOTAL: &str = "tourclock_joins_total";
    pub const JOIN_SIGNALS_TOTAL: &str = "tourclock_join_signals_total";
    pub const RELAYS_TOTAL: &str = "tourclock_relays_total";
    pub const RELAY_RECIPIENTS_TOTAL: &str = "tourclock_relay_recipients_total";
    pub const RELAY_FAILURES_TOTAL: &str = "tourclock_relay_failures_total";
    pub const ENDPOINT_BROADCASTS_TOTAL: &str = "tourclock_endpoint_broadcasts_total";
    pub const CHANNELS_ACTIVE: &str = "tourclock_channels_active";
    pub const MEMBERS_ACTIVE: &str = "tourclock_members_active";
    pub const ERRORS_TOTAL: &str = "tourclock_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of clock connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of clock connections"
    );
    metrics::describe_counter!(names::JOINS_TOTAL, "Total number of join messages handled");
    metrics::describe_counter!(
        names::JOIN_SIGNALS_TOTAL,
        "Join signals sent to channel managers"
    );
    metrics::describe_counter!(names::RELAYS_TOTAL, "Total number of sync messages relayed");
    metrics::describe_counter!(
        names::RELAY_RECIPIENTS_TOTAL,
        "Total sync deliveries across all recipients"
    );
    metrics::describe_counter!(
        names::RELAY_FAILURES_TOTAL,
        "Sync deliveries that could not be queued"
    );
    metrics::describe_counter!(
        names::ENDPOINT_BROADCASTS_TOTAL,
        "Administrative endpoint broadcasts"
    );
    metrics::describe_gauge!(names::CHANNELS_ACTIVE, "Current number of channels");
    metrics::describe_gauge!(names::MEMBERS_ACTIVE, "Current number of channel members");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a handled join.
pub fn record_join(signalled_manager: bool) {
    counter!(names::JOINS_TOTAL).increment(1);
    if signalled_manager {
        counter!(names::JOIN_SIGNALS_TOTAL).increment(1);
    }
}

/// Record a relayed sync.
pub fn record_relay(delivered: usize, failed: usize) {
    counter!(names::RELAYS_TOTAL).increment(1);
    counter!(names::RELAY_RECIPIENTS_TOTAL).increment(delivered as u64);
    if failed > 0 {
        counter!(names::RELAY_FAILURES_TOTAL).increment(failed as u64);
    }
}

/// Record an endpoint broadcast.
pub fn record_endpoint_broadcast(delivered: usize) {
    counter!(names::ENDPOINT_BROADCASTS_TOTAL).increment(1);
    counter!(names::RELAY_RECIPIENTS_TOTAL, "kind" => "endpoint").increment(delivered as u64);
}

/// Update channel and member gauges.
pub fn set_registry_size(channels: usize, members: usize) {
    gauge!(names::CHANNELS_ACTIVE).set(channels as f64);
    gauge!(names::MEMBERS_ACTIVE).set(members as f64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
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
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed; every call must be a no-op.
        let _guard = ConnectionMetricsGuard::new();
        record_join(true);
        record_relay(3, 1);
        record_endpoint_broadcast(2);
        set_registry_size(1, 2);
        record_error("protocol");
    }
}
