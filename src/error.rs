//! Process-fatal errors.

use crate::config::ConfigError;
use crate::credentials::CredentialError;
use crate::net::listener::ListenerError;

/// Anything that stops the proxy from starting or keeps it from running.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("credential error: {0}")]
    Credentials(#[from] CredentialError),

    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),
}
