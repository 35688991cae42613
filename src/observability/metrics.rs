//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): requests by method, status
//! - `bridge_request_duration_seconds` (histogram): end-to-end latency
//! - `bridge_script_executions_total` (counter): script runs by outcome
//! - `bridge_script_duration_seconds` (histogram): time spent in the interpreter
//! - `bridge_active_scripts` (gauge): interpreters currently running
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - Prometheus exporter runs its own listener, separate from the API port

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed API request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "bridge_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("bridge_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record one interpreter run.
pub fn record_execution(outcome: &'static str, elapsed: Duration) {
    metrics::counter!("bridge_script_executions_total", "outcome" => outcome).increment(1);
    metrics::histogram!("bridge_script_duration_seconds").record(elapsed.as_secs_f64());
}

/// Keeps `bridge_active_scripts` raised for as long as it lives.
pub struct ActiveScriptGuard(());

impl ActiveScriptGuard {
    pub fn new() -> Self {
        metrics::gauge!("bridge_active_scripts").increment(1.0);
        Self(())
    }
}

impl Default for ActiveScriptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ActiveScriptGuard {
    fn drop(&mut self) {
        metrics::gauge!("bridge_active_scripts").decrement(1.0);
    }
}
