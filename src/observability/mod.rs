//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarding engine (per state transition):
//!     → events.rs (ForwardEvent on an unbounded channel, never blocks)
//!
//! Consumer task:
//!     → logging.rs (one structured tracing record per event)
//!     → metrics.rs (counters, histograms; Prometheus scrape when enabled)
//! ```
//!
//! # Design Decisions
//! - The engine emits; it never formats or persists
//! - Request ID flows through every event
//! - A closed channel drops events silently

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{EventSink, ForwardEvent, RequestMeta};
