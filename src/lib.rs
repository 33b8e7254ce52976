//! HTTP/HTTPS forwarding proxy library.

pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod targets;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::ForwardingEngine;
pub use lifecycle::Shutdown;
