//! Metrics collection and exposition.
//!
//! # Metrics
//! - `control_apply_total` (counter): save-and-apply outcomes by result
//! - `control_apply_duration_seconds` (histogram): end-to-end apply latency
//! - `control_worker_errors_total` (counter): worker-control failures by step
//! - `control_config_reloads_total` (counter): watcher reloads by result
//! - `control_stack_status` (gauge): 0=unavailable, 1=no workers, 2=partial, 3=running

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

pub fn record_apply(outcome: &'static str, started: Instant) {
    counter!("control_apply_total", "outcome" => outcome).increment(1);
    histogram!("control_apply_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_worker_error(step: &'static str) {
    counter!("control_worker_errors_total", "step" => step).increment(1);
}

pub fn record_config_reload(result: &'static str) {
    counter!("control_config_reloads_total", "result" => result).increment(1);
}

pub fn record_stack_status(level: u8) {
    gauge!("control_stack_status").set(level as f64);
}
