//! Metrics collection and exposition.
//!
//! # Metrics
//! - `forwarder_requests_total` (counter): relayed responses by listener, status
//! - `forwarder_upstream_errors_total` (counter): failed requests by error code
//! - `forwarder_local_responses_total` (counter): locally answered requests
//! - `forwarder_request_duration_seconds` (histogram): time to final outcome

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::observability::events::ForwardEvent;

/// Start the Prometheus scrape endpoint. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

/// Update counters for one event.
pub fn record_event(event: &ForwardEvent) {
    let listener = event.meta().listener.as_str();
    match event {
        ForwardEvent::RequestForwarded { .. } => {
            metrics::counter!("forwarder_upstream_attempts_total", "listener" => listener).increment(1);
        }
        ForwardEvent::ForwardResponse { status, elapsed, .. } => {
            metrics::counter!(
                "forwarder_requests_total",
                "listener" => listener,
                "status" => status.to_string()
            )
            .increment(1);
            metrics::histogram!("forwarder_request_duration_seconds", "listener" => listener)
                .record(elapsed.as_secs_f64());
        }
        ForwardEvent::ForwardError { code, elapsed, .. } => {
            metrics::counter!(
                "forwarder_upstream_errors_total",
                "listener" => listener,
                "code" => *code
            )
            .increment(1);
            metrics::histogram!("forwarder_request_duration_seconds", "listener" => listener)
                .record(elapsed.as_secs_f64());
        }
        ForwardEvent::LocalResponse { .. } => {
            metrics::counter!("forwarder_local_responses_total", "listener" => listener).increment(1);
        }
    }
}
