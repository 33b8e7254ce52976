//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order from a validated config
//! - Obtain TLS credentials before any listener binds
//! - Bind listeners last, so traffic only arrives once everything is ready
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Both listeners share one upstream client, event sink and in-flight
//!   tracker; each has its own engine and target list

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::{validate_config, ConfigError, ListenerKind, ProxyConfig};
use crate::credentials::CredentialStore;
use crate::error::ProxyError;
use crate::http::{upstream_client, ForwardingEngine};
use crate::lifecycle::shutdown::{Shutdown, DRAIN_TIMEOUT};
use crate::lifecycle::signals::shutdown_on_signal;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{ListenerManager, RunningListeners};
use crate::observability::logging::spawn_event_logger;
use crate::observability::metrics::init_metrics;
use crate::observability::EventSink;

/// A proxy whose listeners are bound and serving.
#[derive(Debug)]
pub struct RunningProxy {
    listeners: RunningListeners,
    tracker: ConnectionTracker,
    events: JoinHandle<()>,
}

impl RunningProxy {
    pub fn http_addr(&self) -> SocketAddr {
        self.listeners.http_addr()
    }

    pub fn https_addr(&self) -> Option<SocketAddr> {
        self.listeners.https_addr()
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Wait for the listeners to stop, then for in-flight requests to drain.
    pub async fn wait(self) -> Result<(), ProxyError> {
        let result = self.listeners.wait().await;

        let in_flight = self.tracker.active_count();
        if !self.tracker.drain(DRAIN_TIMEOUT).await {
            tracing::warn!(in_flight = self.tracker.active_count(), "Requests still in flight at exit");
        } else if in_flight > 0 {
            tracing::info!(drained = in_flight, "In-flight requests drained");
        }

        // The logger ends once the last engine, and with it the last sink, is dropped.
        if tokio::time::timeout(DRAIN_TIMEOUT, self.events).await.is_err() {
            tracing::warn!("Event logger did not finish");
        }
        result.map_err(ProxyError::from)
    }
}

/// Build every subsystem from `config` and bind the listeners.
pub async fn start(config: &ProxyConfig, shutdown: &Shutdown) -> Result<RunningProxy, ProxyError> {
    validate_config(config).map_err(ConfigError::Validation)?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let (events, rx) = EventSink::channel();
    let tracker = ConnectionTracker::new();
    let client = upstream_client();

    let http_engine = Arc::new(ForwardingEngine::from_config(
        ListenerKind::Http,
        config,
        client.clone(),
        events.clone(),
        tracker.clone(),
    )?);
    tracing::info!(
        listener = %ListenerKind::Http,
        targets = http_engine.registry().len(),
        "Engine ready"
    );

    let https = if config.listener.https_enabled {
        let pair = CredentialStore::from_config(&config.tls).load().await?;
        let engine = Arc::new(ForwardingEngine::from_config(
            ListenerKind::Https,
            config,
            client,
            events,
            tracker.clone(),
        )?);
        tracing::info!(
            listener = %ListenerKind::Https,
            targets = engine.registry().len(),
            "Engine ready"
        );
        Some((engine, pair))
    } else {
        drop(events);
        None
    };

    let event_task = spawn_event_logger(rx);
    let listeners = match ListenerManager::new(&config.listener)
        .start(http_engine, https, shutdown)
        .await
    {
        Ok(listeners) => listeners,
        Err(e) => {
            event_task.abort();
            return Err(e.into());
        }
    };

    Ok(RunningProxy {
        listeners,
        tracker,
        events: event_task,
    })
}

/// Start the proxy and serve until SIGINT or SIGTERM.
pub async fn run(config: ProxyConfig) -> Result<(), ProxyError> {
    let shutdown = Shutdown::new();
    let proxy = start(&config, &shutdown).await?;

    tokio::spawn(shutdown_on_signal(shutdown.clone()));
    proxy.wait().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
