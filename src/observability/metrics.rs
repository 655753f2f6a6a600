//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mesh_registrations_total` (counter): registrations by service
//! - `mesh_evictions_total` (counter): heartbeat evictions by service
//! - `mesh_directory_size` (gauge): current number of registered services
//! - `mesh_heartbeat_probes_total` (counter): probes by service and outcome
//! - `mesh_routes_total` (counter): dispatches by method and match outcome
//! - `mesh_ws_fanout_total` (counter): relayed WS replies by url
//!
//! # Design Decisions
//! - Free recording functions so call sites stay one line
//! - Exposition via the Prometheus exporter's own HTTP listener

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`. Failure is logged, never
/// fatal: the mesh runs fine without exposition.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_registration(service: &str) {
    counter!("mesh_registrations_total", "service" => service.to_string()).increment(1);
}

pub fn record_eviction(service: &str) {
    counter!("mesh_evictions_total", "service" => service.to_string()).increment(1);
}

pub fn record_directory_size(size: usize) {
    gauge!("mesh_directory_size").set(size as f64);
}

pub fn record_probe(service: &str, alive: bool) {
    let outcome = if alive { "ok" } else { "failed" };
    counter!(
        "mesh_heartbeat_probes_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_route(method: &str, matched: bool) {
    let outcome = if matched { "matched" } else { "miss" };
    counter!(
        "mesh_routes_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_ws_fanout(url: &str, delivered: usize) {
    counter!("mesh_ws_fanout_total", "url" => url.to_string()).increment(delivered as u64);
}
