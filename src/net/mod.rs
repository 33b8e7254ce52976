//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     listener.rs (bind plain + TLS, fail fast if either cannot bind)
//!     → tls.rs (rustls config from the in-memory credential pair)
//!
//! Per request:
//!     accepted connection → HTTP layer
//!     → connection.rs (in-flight guard, released on completion or abort)
//! ```
//!
//! # Design Decisions
//! - Listeners run independently; neither gates the other once bound
//! - Each request is tracked for graceful shutdown

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ListenerError, ListenerManager, RunningListeners};
