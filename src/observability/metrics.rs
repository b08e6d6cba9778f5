//! Metrics collection and exposition.
//!
//! # Metrics
//! - `runtime_bundles_registered_total` (counter)
//! - `runtime_requests_total` (counter): by method, status
//! - `runtime_request_duration_seconds` (histogram): by method
//! - `runtime_shutdowns_total` (counter): by outcome
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_bundle_registered() {
    counter!("runtime_bundles_registered_total").increment(1);
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "runtime_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("runtime_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_shutdown(outcome: &'static str) {
    counter!("runtime_shutdowns_total", "outcome" => outcome).increment(1);
}
