//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → metrics, event logger → engines → TLS credentials
//!     → bind listeners (both or none)
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → drain in-flight requests → exit 0
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Shutdown has a deadline; requests still running after it are abandoned

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, start, RunningProxy};
