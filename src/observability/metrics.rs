//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define console metrics (requests, latency, watchdog state)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `console_requests_total` (counter): total requests by method, status
//! - `console_request_duration_seconds` (histogram): latency distribution
//! - `console_admin_watchdog_armed` (gauge): 1=armed, 0=disarmed
//! - `console_admin_watchdog_expirations_total` (counter): deadline outcomes

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with its own HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a completed HTTP request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!(
        "console_requests_total",
        "method" => method.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!("console_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record whether the admin watchdog is armed.
pub fn record_watchdog_armed(armed: bool) {
    gauge!("console_admin_watchdog_armed").set(if armed { 1.0 } else { 0.0 });
}

/// Record how an armed period ended at its deadline.
///
/// `outcome` is one of `initialized`, `uninitialized`, `store_error`.
pub fn record_watchdog_expiration(outcome: &'static str) {
    counter!("console_admin_watchdog_expirations_total", "outcome" => outcome).increment(1);
}
