//! Request id allocation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of JSON-RPC request ids.
///
/// Ids must be unique for the lifetime of a client and must never be
/// reused, otherwise a late response could be matched to the wrong call.
pub trait IdGenerator: Send + Sync {
    /// Allocate the next id.
    fn next_id(&self) -> u64;
}

/// Monotonic ids starting at 1.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Start counting at 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Start counting at `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}
