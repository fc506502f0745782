//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gatekeeper_requests_total` (counter): requests by outcome (passed, rejected)
//! - `gatekeeper_rejections_total` (counter): rejections by pipeline stage
//! - `gatekeeper_egress_decisions_total` (counter): egress checks by decision
//! - `gatekeeper_rate_limit_tracked_clients` (gauge): identifiers in the rate-limit table
//!
//! Recording without an installed recorder is a no-op, so tests need no setup.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(outcome: &'static str) {
    ::metrics::counter!("gatekeeper_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_rejection(stage: &'static str) {
    ::metrics::counter!("gatekeeper_rejections_total", "stage" => stage).increment(1);
}

pub fn record_egress_decision(decision: &'static str) {
    ::metrics::counter!("gatekeeper_egress_decisions_total", "decision" => decision).increment(1);
}

pub fn record_tracked_clients(count: usize) {
    ::metrics::gauge!("gatekeeper_rate_limit_tracked_clients").set(count as f64);
}
