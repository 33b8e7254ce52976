//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Turn forwarding events into structured log records

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::observability::events::ForwardEvent;
use crate::observability::metrics;

/// Install the global subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    let fallback = format!("http_forwarder={default_level},tower_http={default_level}");
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Consume events until every sink is dropped.
pub fn spawn_event_logger(mut events: mpsc::UnboundedReceiver<ForwardEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
            metrics::record_event(&event);
        }
        tracing::debug!("Event channel closed");
    })
}

fn log_event(event: &ForwardEvent) {
    let meta = event.meta();
    match event {
        ForwardEvent::RequestForwarded { host, attempt, .. } => {
            tracing::info!(
                event = event.name(),
                request_id = %meta.request_id,
                listener = %meta.listener,
                attempt,
                "=> {} {}{}",
                meta.method,
                host,
                meta.path
            );
        }
        ForwardEvent::ForwardResponse {
            host,
            status,
            attempt,
            elapsed,
            ..
        } => {
            tracing::info!(
                event = event.name(),
                request_id = %meta.request_id,
                listener = %meta.listener,
                status,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "{} responded: {}",
                host,
                status
            );
        }
        ForwardEvent::ForwardError {
            host,
            code,
            message,
            status,
            attempts,
            ..
        } => {
            tracing::warn!(
                event = event.name(),
                request_id = %meta.request_id,
                listener = %meta.listener,
                method = %meta.method,
                path = %meta.path,
                status,
                attempts,
                "{} failed: {} {}",
                host.as_deref().unwrap_or("-"),
                code,
                message
            );
        }
        ForwardEvent::LocalResponse { status, .. } => {
            tracing::debug!(
                event = event.name(),
                request_id = %meta.request_id,
                listener = %meta.listener,
                method = %meta.method,
                path = %meta.path,
                status,
                "Answered locally"
            );
        }
    }
}
