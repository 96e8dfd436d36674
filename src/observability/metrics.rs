//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): requests by method, status
//! - `gate_request_duration_seconds` (histogram): latency distribution
//! - `gate_rate_limited_total` (counter): rejections by purpose
//! - `gate_rate_windows` (gauge): live rate-limit windows after a sweep
//! - `gate_origin_blocked_total` (counter): requests refused by the edge gate
//! - `gate_identity_verifications_total` (counter): verifier outcomes
//! - `gate_errors_total` (counter): classified failures by status and kind

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "gate_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gate_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(purpose: &str) {
    counter!("gate_rate_limited_total", "purpose" => purpose.to_string()).increment(1);
}

pub fn record_rate_windows(live: usize) {
    gauge!("gate_rate_windows").set(live as f64);
}

pub fn record_origin_blocked() {
    counter!("gate_origin_blocked_total").increment(1);
}

pub fn record_verification(outcome: &'static str) {
    counter!("gate_identity_verifications_total", "outcome" => outcome).increment(1);
}

pub fn record_error(status: u16, kind: &'static str) {
    counter!(
        "gate_errors_total",
        "status" => status.to_string(),
        "kind" => kind
    )
    .increment(1);
}
