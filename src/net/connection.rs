//! In-flight request tracking.
//!
//! # Responsibilities
//! - Generate unique context IDs for tracing
//! - Count requests currently being forwarded
//! - Let shutdown wait until that count drains to zero
//!
//! # Design Decisions
//! - A guard owns each slot; dropping the request (including when the
//!   client aborts) releases it
//! - The count lives in a watch channel so waiters wake on change instead
//!   of polling

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Relaxed ordering is enough: IDs only need to be unique.
static CONTEXT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of one inbound request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONTEXT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Counts in-flight requests. Clones share the same count.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<watch::Sender<u64>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { active: Arc::new(tx) }
    }

    /// Record a new in-flight request. The slot is released when the guard drops.
    pub fn track(&self) -> ConnectionGuard {
        self.active.send_modify(|n| *n += 1);
        ConnectionGuard {
            active: Arc::clone(&self.active),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        *self.active.borrow()
    }

    /// Wait until no request is in flight.
    pub async fn wait_for_idle(&self) {
        let mut rx = self.active.subscribe();
        // The sender lives in `self`, so this only errors if it is dropped.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Wait until idle or `deadline` passes. Returns whether it drained.
    pub async fn drain(&self, deadline: Duration) -> bool {
        tokio::time::timeout(deadline, self.wait_for_idle()).await.is_ok()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds one in-flight slot.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<watch::Sender<u64>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
        tracing::trace!(context = %self.id, "Request context released");
    }
}
