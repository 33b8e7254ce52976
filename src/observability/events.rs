//! Forwarding events and the sink the engine publishes them on.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::ListenerKind;

/// Fields every event carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    pub request_id: String,
    pub listener: ListenerKind,
    pub method: String,
    pub path: String,
}

/// One observable step of a request's lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardEvent {
    /// An upstream attempt is about to be dispatched.
    RequestForwarded {
        meta: RequestMeta,
        host: String,
        attempt: u32,
    },
    /// An upstream response is being relayed.
    ForwardResponse {
        meta: RequestMeta,
        host: String,
        status: u16,
        attempt: u32,
        elapsed: Duration,
    },
    /// The request failed; `status` is what the client was sent.
    ForwardError {
        meta: RequestMeta,
        host: Option<String>,
        code: &'static str,
        message: String,
        status: u16,
        attempts: u32,
        elapsed: Duration,
    },
    /// The request was answered locally without contacting an upstream.
    LocalResponse {
        meta: RequestMeta,
        status: u16,
        elapsed: Duration,
    },
}

impl ForwardEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ForwardEvent::RequestForwarded { .. } => "request-forwarded",
            ForwardEvent::ForwardResponse { .. } => "forward-response",
            ForwardEvent::ForwardError { .. } => "forward-error",
            ForwardEvent::LocalResponse { .. } => "local-response",
        }
    }

    pub fn meta(&self) -> &RequestMeta {
        match self {
            ForwardEvent::RequestForwarded { meta, .. }
            | ForwardEvent::ForwardResponse { meta, .. }
            | ForwardEvent::ForwardError { meta, .. }
            | ForwardEvent::LocalResponse { meta, .. } => meta,
        }
    }
}

/// Publishing half of the event channel. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ForwardEvent>>,
}

impl EventSink {
    /// Create a sink and the receiver its events arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ForwardEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ForwardEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
