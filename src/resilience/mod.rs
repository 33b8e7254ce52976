//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream attempt:
//!     → timeouts.rs (bound one attempt, timeout = network failure)
//!     → retries.rs (classify outcome, decide whether to retry)
//!     → backoff.rs (delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Every function here is pure or a thin wrapper over Tokio's timer
//! - The timeout bounds one attempt, never the whole retry sequence
//! - Connection errors always retryable; 5xx only when the policy opts in

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use backoff::backoff_delay;
pub use retries::{should_retry, ForwardOutcome, NetworkErrorKind, NetworkFailure, RetryPolicy};
