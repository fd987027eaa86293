//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): tenant requests by action, status
//! - `relay_request_duration_seconds` (histogram): handler latency by action
//! - `relay_tenants` (gauge): configurations in the cache
//! - `relay_notifications_total` (counter): notifications by kind, outcome
//! - `relay_listener_connected` (gauge): 1=subscribed, 0=reconnecting, per kind
//! - `relay_resyncs_total` (counter): full reconciles by outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - Prometheus exposition runs on its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed tenant request.
pub fn record_request(action: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!("relay_requests_total", "action" => action.to_string(), "status" => status).increment(1);
    histogram!("relay_request_duration_seconds", "action" => action.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record the number of cached configurations.
pub fn record_tenant_count(count: usize) {
    gauge!("relay_tenants").set(count as f64);
}

/// Record the outcome of one store notification.
pub fn record_notification(kind: &str, outcome: &'static str) {
    counter!("relay_notifications_total", "kind" => kind.to_string(), "outcome" => outcome).increment(1);
}

/// Record whether a notification listener is currently subscribed.
pub fn record_listener_connected(kind: &str, connected: bool) {
    gauge!("relay_listener_connected", "kind" => kind.to_string()).set(if connected { 1.0 } else { 0.0 });
}

/// Record a full reconcile against the store.
pub fn record_resync(outcome: &'static str) {
    counter!("relay_resyncs_total", "outcome" => outcome).increment(1);
}
