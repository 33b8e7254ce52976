//! Round-robin target rotation.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin selector.
/// Stores an internal counter shared by every request of one listener.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the next target among `len`, or `None` when there are none.
    ///
    /// The counter wraps on overflow; concurrent callers may observe an
    /// uneven split but never an index outside `0..len`.
    pub fn next_index(&self, len: usize) -> Option<usize> {
        match len {
            0 => None,
            1 => Some(0),
            _ => Some(self.counter.fetch_add(1, Ordering::Relaxed) % len),
        }
    }
}
