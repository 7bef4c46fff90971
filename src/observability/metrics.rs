//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): dispatched requests by method, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_routes` (gauge): entries in the published routing table
//! - `gateway_reloads_total` (counter): rebuilds by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until `init_metrics` installs the exporter
//! - No per-route labels (credential-derived ids stay out of scrapes)

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter, serving scrapes on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    ::metrics::describe_counter!("gateway_requests_total", "Requests handled by the dispatcher");
    ::metrics::describe_histogram!(
        "gateway_request_duration_seconds",
        ::metrics::Unit::Seconds,
        "Time from request arrival to response headers"
    );
    ::metrics::describe_gauge!("gateway_routes", "Routes in the published table");
    ::metrics::describe_counter!("gateway_reloads_total", "Routing table rebuilds");

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one dispatched request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record a rebuild outcome (`published`, `stale`, `failed`).
pub fn record_reload(outcome: &'static str) {
    ::metrics::counter!("gateway_reloads_total", "outcome" => outcome).increment(1);
}

pub fn set_route_count(routes: usize) {
    ::metrics::gauge!("gateway_routes").set(routes as f64);
}
