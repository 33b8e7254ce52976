//! HTTP handling subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (plain or TLS listener)
//!     → server.rs (Axum router, request ID, tracing)
//!     → forwarder.rs (state machine, retries, events)
//!         → request.rs (per-request context and state)
//!         → translate.rs (path, headers, auth for the chosen target)
//!         → upstream client (one attempt, bounded by timeout)
//!     → response.rs (relay upstream response or synthesize one)
//!     → Send to client
//! ```

pub mod forwarder;
pub mod request;
pub mod response;
pub mod server;
pub mod translate;

pub use forwarder::{upstream_client, EngineSettings, ForwardingEngine, UpstreamClient};
pub use request::{ForwardState, InboundRequestContext, X_REQUEST_ID};
pub use response::{LocalResponder, UpstreamResponse};
pub use server::build_router;
pub use translate::{translate, OutboundRequest, TranslationError};
