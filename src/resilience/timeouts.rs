//! Timeout enforcement for one upstream attempt.

use std::future::Future;
use std::time::Duration;

/// Marker error for an attempt that ran past its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("upstream attempt timed out after {0:?}")]
pub struct AttemptTimedOut(pub Duration);

/// Run `fut` under an optional deadline. With no limit the future runs to
/// completion. On expiry the future is dropped, which releases its socket.
pub async fn with_attempt_timeout<F, T>(limit: Option<Duration>, fut: F) -> Result<T, AttemptTimedOut>
where
    F: Future<Output = T>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| AttemptTimedOut(limit)),
        None => Ok(fut.await),
    }
}
