//! Metrics collection and exposition.
//!
//! # Metrics
//! - `edge_requests_total` (counter): requests by method, status
//! - `edge_request_duration_seconds` (histogram): ingress-to-response latency
//! - `edge_errors_total` (counter): classified failures by kind, code
//! - `edge_retry_attempts_total` (counter): outbound retries by outcome
//! - `edge_probe_status` (gauge): 1=healthy, 0.5=degraded, 0=unhealthy
//! - `edge_probe_duration_seconds` (histogram): probe latency
//! - `edge_rate_limited_total` (counter): rejected requests by exhausted window
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an exporter it is a no-op
//! - Prometheus exporter is opt-in via configuration

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::errors::ErrorKind;
use crate::health::HealthStatus;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!("edge_requests_total", "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!("edge_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_error(kind: ErrorKind, code: &str) {
    counter!("edge_errors_total", "kind" => kind.as_str(), "code" => code.to_string()).increment(1);
}

pub fn record_retry(outcome: &'static str) {
    counter!("edge_retry_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_probe(name: &str, status: HealthStatus, elapsed: Duration) {
    let value = match status {
        HealthStatus::Healthy => 1.0,
        HealthStatus::Degraded => 0.5,
        HealthStatus::Unhealthy => 0.0,
    };
    gauge!("edge_probe_status", "probe" => name.to_string()).set(value);
    histogram!("edge_probe_duration_seconds", "probe" => name.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_rate_limited(window: &'static str) {
    counter!("edge_rate_limited_total", "window" => window).increment(1);
}
