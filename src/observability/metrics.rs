//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, balancer
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `lb_dispatch_total` (counter): dispatch outcomes by balancer
//! - `lb_selections_total` (counter): backend picks by search step
//! - `lb_backend_failures_total` (counter): failed forwards by backend

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, balancer: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("balancer", balancer.to_string()),
    ];
    ::metrics::counter!("proxy_requests_total", &labels).increment(1);
    ::metrics::histogram!("proxy_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

/// `outcome` is one of `success`, `fatal`, `exhausted`.
pub fn record_dispatch(balancer: &str, outcome: &'static str) {
    ::metrics::counter!(
        "lb_dispatch_total",
        "balancer" => balancer.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_selection(balancer: &str, backend: &str, search: &'static str) {
    ::metrics::counter!(
        "lb_selections_total",
        "balancer" => balancer.to_string(),
        "backend" => backend.to_string(),
        "search" => search
    )
    .increment(1);
}

pub fn record_backend_failure(balancer: &str, backend: &str, recoverable: bool) {
    ::metrics::counter!(
        "lb_backend_failures_total",
        "balancer" => balancer.to_string(),
        "backend" => backend.to_string(),
        "recoverable" => if recoverable { "true" } else { "false" }
    )
    .increment(1);
}
