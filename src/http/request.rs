//! Inbound request context.
//!
//! # Responsibilities
//! - Capture method, path, headers and buffered body of one request
//! - Track the chosen target, attempt counter and elapsed time
//! - Enforce the lifecycle state machine
//!
//! # Lifecycle
//! ```text
//! Received → Translating → Dispatching → AwaitingResponse → Relaying → Done
//!                               ↑                │
//!                               └─── Retrying ←──┘
//! ```
//! Received may end directly in Done (answered locally) or Failed (body
//! unreadable). Every state between Translating and Retrying may end in Failed.

use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};

use crate::net::connection::{ConnectionGuard, ConnectionId};

/// Header carrying the request ID assigned at the listener.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Lifecycle state of one inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardState {
    Received,
    Translating,
    Dispatching,
    AwaitingResponse,
    Retrying,
    Relaying,
    Done,
    Failed,
}

impl ForwardState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: ForwardState) -> bool {
        use ForwardState::*;
        matches!(
            (self, next),
            (Received, Translating)
                | (Received, Done)
                | (Received, Failed)
                | (Translating, Dispatching)
                | (Translating, Failed)
                | (Dispatching, AwaitingResponse)
                | (Dispatching, Failed)
                | (AwaitingResponse, Relaying)
                | (AwaitingResponse, Retrying)
                | (AwaitingResponse, Failed)
                | (Retrying, Dispatching)
                | (Retrying, Failed)
                | (Relaying, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ForwardState::Done | ForwardState::Failed)
    }
}

/// Per-request state, owned by the engine invocation handling it.
#[derive(Debug)]
pub struct InboundRequestContext {
    id: ConnectionId,
    pub request_id: String,
    pub method: Method,
    /// Path and query. `None` for requests without one (authority-form).
    pub path: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Index of the target the current attempt goes to.
    pub target: Option<usize>,
    /// Upstream attempts dispatched so far.
    pub attempt: u32,
    started: Instant,
    state: ForwardState,
    _guard: Option<ConnectionGuard>,
}

impl InboundRequestContext {
    pub fn new(method: Method, path: Option<String>, headers: HeaderMap, body: Bytes) -> Self {
        let request_id = headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            id: ConnectionId::new(),
            request_id,
            method,
            path,
            headers,
            body,
            target: None,
            attempt: 0,
            started: Instant::now(),
            state: ForwardState::Received,
            _guard: None,
        }
    }

    /// Count this context as in flight until it is dropped.
    pub fn tracked(mut self, guard: ConnectionGuard) -> Self {
        self.id = guard.id();
        self._guard = Some(guard);
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ForwardState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Path for logging; empty when the request had none.
    pub fn display_path(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }

    /// Move to `next`. Illegal transitions are a programming error.
    pub fn advance(&mut self, next: ForwardState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(context = %self.id, from = ?self.state, to = ?next, "State transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionTracker;
    use axum::http::HeaderValue;
    use super::ForwardState::*;

    #[test]
    fn happy_path_with_retry_is_legal() {
        let path = [
            Received,
            Translating,
            Dispatching,
            AwaitingResponse,
            Retrying,
            Dispatching,
            AwaitingResponse,
            Relaying,
            Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        let all = [
            Received,
            Translating,
            Dispatching,
            AwaitingResponse,
            Retrying,
            Relaying,
            Done,
            Failed,
        ];
        for next in all {
            assert!(!Done.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
        assert!(Done.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn retry_cannot_skip_dispatch() {
        assert!(!Retrying.can_transition_to(AwaitingResponse));
        assert!(!Retrying.can_transition_to(Relaying));
        assert!(!Translating.can_transition_to(AwaitingResponse));
    }

    #[test]
    fn missing_request_id_gets_a_fresh_one() {
        let a = InboundRequestContext::new(Method::GET, None, HeaderMap::new(), Bytes::new());
        let b = InboundRequestContext::new(Method::GET, None, HeaderMap::new(), Bytes::new());
        assert_eq!(a.request_id.len(), 36);
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn context_reads_request_id_and_tracks_lifetime() {
        let tracker = ConnectionTracker::new();
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc-123"));

        let guard = tracker.track();
        let guard_id = guard.id();
        let mut ctx = InboundRequestContext::new(Method::GET, Some("/x".into()), headers, Bytes::new())
            .tracked(guard);
        assert_eq!(ctx.id(), guard_id);
        assert_eq!(ctx.request_id, "abc-123");
        assert_eq!(tracker.active_count(), 1);

        ctx.advance(Translating);
        assert_eq!(ctx.state(), Translating);

        drop(ctx);
        assert_eq!(tracker.active_count(), 0);
    }
}
