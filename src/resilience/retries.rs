//! Retry logic.
//!
//! # Responsibilities
//! - Classify the outcome of one upstream attempt
//! - Decide whether another attempt is allowed
//!
//! # Design Decisions
//! - Connection errors and timeouts are always retryable
//! - 5xx is only a failure when the policy opts in; otherwise it is relayed
//! - 4xx is a successful exchange and never retried

use axum::http::StatusCode;

use crate::http::response::UpstreamResponse;

/// Retry policy of one target. Immutable once resolved; targets without
/// their own retry options share one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Backoff slot in milliseconds.
    pub base_delay_millis: u64,
    /// Treat 5xx responses as retryable failures.
    pub retry_on_server_error: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_millis: 300,
            retry_on_server_error: false,
        }
    }
}

/// Why an upstream attempt produced no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// Could not connect (refused, DNS, TLS handshake).
    Connect,
    /// The attempt ran past its deadline.
    Timeout,
    /// The connection failed after it was established.
    Io,
    /// The upstream response body exceeded the buffer limit.
    BodyTooLarge,
}

impl NetworkErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkErrorKind::Connect => "ECONNECT",
            NetworkErrorKind::Timeout => "ETIMEDOUT",
            NetworkErrorKind::Io => "EIO",
            NetworkErrorKind::BodyTooLarge => "EBODYTOOLARGE",
        }
    }
}

/// A failed attempt with its cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkFailure {
    pub kind: NetworkErrorKind,
    pub message: String,
}

impl NetworkFailure {
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for NetworkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.message)
    }
}

/// Result of one upstream attempt.
#[derive(Debug)]
pub enum ForwardOutcome {
    Success(UpstreamResponse),
    NetworkFailure(NetworkFailure),
    UpstreamServerError(StatusCode),
}

impl ForwardOutcome {
    /// Classify a completed exchange under `policy`.
    pub fn classify(result: Result<UpstreamResponse, NetworkFailure>, policy: &RetryPolicy) -> Self {
        match result {
            Ok(response) if response.status.is_server_error() && policy.retry_on_server_error => {
                ForwardOutcome::UpstreamServerError(response.status)
            }
            Ok(response) => ForwardOutcome::Success(response),
            Err(failure) => ForwardOutcome::NetworkFailure(failure),
        }
    }
}

/// Whether retry number `attempt` (1 for the first retry) may be scheduled.
pub fn should_retry(policy: &RetryPolicy, attempt: u32, outcome: &ForwardOutcome) -> bool {
    if attempt > policy.max_retries {
        return false;
    }
    match outcome {
        ForwardOutcome::NetworkFailure(_) => true,
        ForwardOutcome::UpstreamServerError(_) => policy.retry_on_server_error,
        ForwardOutcome::Success(_) => false,
    }
}
