//! Metrics collection and export for Relay.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format when enabled.

use async_trait::async_trait;
use bytes::Bytes;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use relay_core::{HubHandle, HubStats};
use relay_transport::{MessageSink, MessageStream, TransportError};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};

/// How often hub statistics are copied into gauges.
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
    pub const MESSAGES_TOTAL: &str = "relay_messages_total";
    pub const MESSAGES_BYTES: &str = "relay_messages_bytes";
    pub const HUB_MEMBERS: &str = "relay_hub_members";
    pub const EVICTIONS_TOTAL: &str = "relay_evictions_total";
    pub const DROPPED_TOTAL: &str = "relay_dropped_envelopes_total";
    pub const ERRORS_TOTAL: &str = "relay_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open WebSocket connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of messages processed");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of messages processed");
    metrics::describe_gauge!(names::HUB_MEMBERS, "Connections registered with the hub");
    metrics::describe_counter!(
        names::EVICTIONS_TOTAL,
        "Connections dropped for a full or closed outbox"
    );
    metrics::describe_counter!(
        names::DROPPED_TOTAL,
        "Envelopes dropped because they could not be encoded"
    );
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

/// Periodically copy hub statistics into metrics.
///
/// Stops once the hub is gone.
pub fn spawn_stats_task(hub: HubHandle) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATS_INTERVAL);

        loop {
            ticker.tick().await;

            match hub.stats().await {
                Ok(stats) => record_hub_stats(&stats),
                Err(_) => {
                    debug!("Stats task stopping: hub closed");
                    break;
                }
            }
        }
    });
}

/// Record a snapshot of hub statistics.
pub fn record_hub_stats(stats: &HubStats) {
    gauge!(names::HUB_MEMBERS).set(stats.members as f64);
    counter!(names::EVICTIONS_TOTAL).absolute(stats.evicted_total);
    counter!(names::DROPPED_TOTAL).absolute(stats.dropped_total);
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

/// Record a message.
pub fn record_message(bytes: usize, direction: &str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction.to_string()).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction.to_string()).increment(bytes as u64);
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

/// Read half wrapper that counts inbound messages.
pub struct Metered<T>(pub T);

#[async_trait]
impl<T: MessageStream> MessageStream for Metered<T> {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        let result = self.0.recv().await;
        match &result {
            Ok(Some(text)) => record_message(text.len(), "inbound"),
            Ok(None) => {}
            Err(_) => record_error("read"),
        }
        result
    }
}

#[async_trait]
impl<T: MessageSink> MessageSink for Metered<T> {
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        let len = payload.len();
        let result = self.0.send(payload).await;
        match &result {
            Ok(()) => record_message(len, "outbound"),
            Err(_) => record_error("write"),
        }
        result
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.close().await
    }
}
