//! Response correlation between the stdout reader and waiting callers.
//!
//! A caller registers its request id before the request is written. The
//! reader thread hands each decoded message to [`Inbox::deliver`], which
//! drops it straight into the matching slot and wakes waiters. Messages
//! nobody registered for (notifications, responses to calls that already
//! gave up) are parked in a bounded ring instead, so they can never be
//! consumed by the wrong caller.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde_json::Value;

/// Default number of unclaimed messages kept before the oldest is evicted.
pub const DEFAULT_UNCLAIMED_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct InboxState {
    /// Registered ids; `Some` once the response has arrived.
    waiting: HashMap<u64, Option<Value>>,
    /// Messages that matched no registered id, oldest first.
    unclaimed: VecDeque<Value>,
    /// Set once the reader has seen end-of-stream.
    closed: bool,
}

/// Shared correlation state.
#[derive(Debug)]
pub struct Inbox {
    state: Mutex<InboxState>,
    arrived: Condvar,
    unclaimed_capacity: usize,
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new(DEFAULT_UNCLAIMED_CAPACITY)
    }
}

impl Inbox {
    /// Create an inbox keeping at most `unclaimed_capacity` unmatched messages.
    pub fn new(unclaimed_capacity: usize) -> Self {
        Self {
            state: Mutex::new(InboxState::default()),
            arrived: Condvar::new(),
            unclaimed_capacity,
        }
    }

    /// Register interest in the response to `id`.
    pub fn register(&self, id: u64) {
        self.state.lock().waiting.insert(id, None);
    }

    /// Stop waiting for `id`. A response arriving later is parked as unclaimed.
    pub fn cancel(&self, id: u64) {
        self.state.lock().waiting.remove(&id);
    }

    /// Route a decoded message to its waiter, or park it.
    pub fn deliver(&self, message: Value) {
        let mut state = self.state.lock();

        let id = message.get("id").and_then(Value::as_u64);
        if let Some(slot) = id.and_then(|id| state.waiting.get_mut(&id)) {
            if slot.is_none() {
                *slot = Some(message);
                drop(state);
                self.arrived.notify_all();
                return;
            }
        }

        tracing::trace!(id = ?id, "parking unclaimed MCP message");
        state.unclaimed.push_back(message);
        while state.unclaimed.len() > self.unclaimed_capacity {
            state.unclaimed.pop_front();
            tracing::debug!(
                capacity = self.unclaimed_capacity,
                "evicted oldest unclaimed MCP message"
            );
        }
    }

    /// Mark the stream as finished and wake every waiter.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.arrived.notify_all();
    }

    /// Whether the reader has seen end-of-stream.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Wait up to `max_wait` for the response to `id`.
    ///
    /// Returns `None` if nothing arrived in that window or `id` is not
    /// registered. The registration is consumed when a response is returned.
    pub fn wait(&self, id: u64, max_wait: Duration) -> Option<Value> {
        let deadline = Instant::now() + max_wait;
        let mut state = self.state.lock();

        loop {
            match state.waiting.get_mut(&id) {
                None => return None,
                Some(slot) => {
                    if let Some(message) = slot.take() {
                        state.waiting.remove(&id);
                        return Some(message);
                    }
                }
            }

            if self.arrived.wait_until(&mut state, deadline).timed_out() {
                let ready = state.waiting.get_mut(&id).and_then(Option::take);
                if ready.is_some() {
                    state.waiting.remove(&id);
                }
                return ready;
            }
        }
    }

    /// Number of registered ids still waiting.
    pub fn pending(&self) -> usize {
        self.state.lock().waiting.len()
    }

    /// Number of parked unclaimed messages.
    pub fn unclaimed_len(&self) -> usize {
        self.state.lock().unclaimed.len()
    }

    /// Take every parked unclaimed message, oldest first.
    pub fn drain_unclaimed(&self) -> Vec<Value> {
        self.state.lock().unclaimed.drain(..).collect()
    }
}
