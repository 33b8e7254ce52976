//! Listener manager.
//!
//! # Responsibilities
//! - Bind the plain listener and, when credentials are supplied, the TLS one
//! - Fail fast if either bind fails; never run half started
//! - Serve each listener with its own engine until shutdown, then drain
//!
//! # Design Decisions
//! - The two listeners start concurrently; readiness means both are bound
//! - Both listeners are served by `axum-server`. The plain socket is bound
//!   up front; the TLS `Handle` reports whether its bind succeeded
//! - Draining on shutdown has a deadline; connections open past it are closed

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum_server::Handle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::{ListenerConfig, ListenerKind};
use crate::credentials::TlsCredentialPair;
use crate::http::{build_router, ForwardingEngine};
use crate::lifecycle::shutdown::{Shutdown, DRAIN_TIMEOUT};

use super::tls::rustls_config;

/// Errors starting or running a listener.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid bind host {host:?}: {reason}")]
    Address { host: String, reason: String },

    #[error("failed to bind {listener} listener on {addr}: {source}")]
    Bind {
        listener: ListenerKind,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TLS credentials: {0}")]
    Tls(#[source] std::io::Error),

    #[error("{listener} listener failed: {source}")]
    Serve {
        listener: ListenerKind,
        #[source]
        source: std::io::Error,
    },
}

type ServeTask = JoinHandle<std::io::Result<()>>;

/// Binds and runs the plain and TLS listeners.
#[derive(Debug, Clone)]
pub struct ListenerManager {
    host: String,
    http_port: u16,
    https_port: u16,
}

impl ListenerManager {
    pub fn new(config: &ListenerConfig) -> Self {
        Self {
            host: config.bind_host.clone(),
            http_port: config.http_port,
            https_port: config.https_port,
        }
    }

    fn addr(&self, port: u16) -> Result<SocketAddr, ListenerError> {
        let ip: IpAddr = self.host.parse().map_err(|e: std::net::AddrParseError| ListenerError::Address {
            host: self.host.clone(),
            reason: e.to_string(),
        })?;
        Ok(SocketAddr::new(ip, port))
    }

    /// Bind every configured listener and start serving.
    ///
    /// Returns once all listeners are bound. If any bind fails, the ones
    /// already started are stopped and the error is returned.
    pub async fn start(
        &self,
        http: Arc<ForwardingEngine>,
        https: Option<(Arc<ForwardingEngine>, TlsCredentialPair)>,
        shutdown: &Shutdown,
    ) -> Result<RunningListeners, ListenerError> {
        let http_addr = self.addr(self.http_port)?;

        let tls = match https {
            Some((engine, pair)) => Some(self.spawn_tls(engine, &pair, shutdown).await?),
            None => None,
        };

        let plain = match self.spawn_plain(http, http_addr, shutdown).await {
            Ok(plain) => plain,
            Err(e) => {
                if let Some((handle, task)) = tls {
                    handle.shutdown();
                    task.abort();
                }
                return Err(e);
            }
        };

        let mut running = RunningListeners {
            http_addr: plain.0,
            https_addr: None,
            tasks: vec![(ListenerKind::Http, plain.1)],
        };

        if let Some((handle, task)) = tls {
            match handle.listening().await {
                Some(addr) => {
                    tracing::info!(address = %addr, listener = %ListenerKind::Https, "Listener bound");
                    running.https_addr = Some(addr);
                    running.tasks.push((ListenerKind::Https, task));
                }
                None => {
                    for (_, task) in &running.tasks {
                        task.abort();
                    }
                    let addr = self.addr(self.https_port)?;
                    let source = match task.await {
                        Ok(Err(e)) => e,
                        Ok(Ok(())) => std::io::Error::other("listener exited before binding"),
                        Err(e) => std::io::Error::other(e.to_string()),
                    };
                    return Err(ListenerError::Bind {
                        listener: ListenerKind::Https,
                        addr,
                        source,
                    });
                }
            }
        }

        tracing::info!(
            http = %running.http_addr,
            https = ?running.https_addr,
            "All listeners ready"
        );
        Ok(running)
    }

    async fn spawn_plain(
        &self,
        engine: Arc<ForwardingEngine>,
        addr: SocketAddr,
        shutdown: &Shutdown,
    ) -> Result<(SocketAddr, ServeTask), ListenerError> {
        let bind_error = |source| ListenerError::Bind {
            listener: ListenerKind::Http,
            addr,
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        tracing::info!(address = %local_addr, listener = %ListenerKind::Http, "Listener bound");

        let listener = listener.into_std().map_err(bind_error)?;

        let handle = Handle::new();
        drain_on_shutdown(handle.clone(), shutdown);
        let app = build_router(engine);
        let server = axum_server::from_tcp(listener).handle(handle);
        let task = tokio::spawn(async move { server.serve(app.into_make_service()).await });
        Ok((local_addr, task))
    }

    async fn spawn_tls(
        &self,
        engine: Arc<ForwardingEngine>,
        pair: &TlsCredentialPair,
        shutdown: &Shutdown,
    ) -> Result<(Handle, ServeTask), ListenerError> {
        let addr = self.addr(self.https_port)?;
        let config = rustls_config(pair).await.map_err(ListenerError::Tls)?;

        let handle = Handle::new();
        let app = build_router(engine);
        let server = axum_server::bind_rustls(addr, config).handle(handle.clone());
        let task = tokio::spawn(async move { server.serve(app.into_make_service()).await });
        drain_on_shutdown(handle.clone(), shutdown);

        Ok((handle, task))
    }
}

/// Stop accepting once shutdown is signalled. Connections still open after
/// `DRAIN_TIMEOUT` are closed, which cancels their requests.
fn drain_on_shutdown(handle: Handle, shutdown: &Shutdown) {
    let signalled = shutdown.signalled();
    tokio::spawn(async move {
        signalled.await;
        handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
    });
}

/// Listeners that are bound and serving.
#[derive(Debug)]
pub struct RunningListeners {
    http_addr: SocketAddr,
    https_addr: Option<SocketAddr>,
    tasks: Vec<(ListenerKind, ServeTask)>,
}

impl RunningListeners {
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn https_addr(&self) -> Option<SocketAddr> {
        self.https_addr
    }

    /// Wait until every listener has stopped. Returns the first failure.
    pub async fn wait(self) -> Result<(), ListenerError> {
        let mut first_error = None;
        for (listener, task) in self.tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(std::io::Error::other(e.to_string())),
            };
            match result {
                Ok(()) => tracing::info!(listener = %listener, "Listener stopped"),
                Err(source) => {
                    tracing::error!(listener = %listener, error = %source, "Listener failed");
                    first_error.get_or_insert(ListenerError::Serve { listener, source });
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
