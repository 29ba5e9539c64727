//! Fire-time-ordered timer queue.
//!
//! Deadlines are kept in a binary heap keyed on `(deadline, sequence)`, so
//! timers registered for the same instant fire in registration order.
//! Cancellation is lazy on the heap side: the promise is removed from the
//! live table immediately and the stale heap slot is skipped when it
//! surfaces.

use crate::promise::Promise;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::time::Instant;

/// Identifies a pending timer for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey(pub(crate) u64);

#[derive(PartialEq, Eq)]
struct Slot {
    at: Instant,
    seq: u64,
    key: u64,
}

// Reversed so the earliest (deadline, sequence) pair sits on top of the
// max-heap.
impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at).then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending timers for one event loop.
pub(crate) struct TimerQueue {
    heap: BinaryHeap<Slot>,
    entries: HashMap<u64, Promise>,
    next: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            entries: HashMap::new(),
            next: 0,
        }
    }

    /// Registers a timer firing at `at`. Equal instants fire in insertion
    /// order.
    pub(crate) fn insert(&mut self, at: Instant) -> (TimerKey, Promise) {
        let key = self.next;
        self.next = self.next.wrapping_add(1);

        let promise = Promise::new();
        self.entries.insert(key, promise.clone());
        self.heap.push(Slot { at, seq: key, key });

        (TimerKey(key), promise)
    }

    /// Removes a pending timer, returning its promise so the caller can
    /// settle it as cancelled. The heap slot goes stale and is skipped when
    /// popped.
    pub(crate) fn cancel(&mut self, key: TimerKey) -> Option<Promise> {
        self.entries.remove(&key.0)
    }

    /// Pops the earliest timer due by `now`, skipping cancelled slots.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<Promise> {
        while let Some(slot) = self.heap.peek() {
            if slot.at > now {
                return None;
            }
            let key = slot.key;
            self.heap.pop();
            if let Some(promise) = self.entries.remove(&key) {
                return Some(promise);
            }
            // Stale slot of a cancelled timer; keep skimming.
        }
        None
    }

    /// The deadline of the earliest live timer, if any.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(slot) = self.heap.peek() {
            if self.entries.contains_key(&slot.key) {
                return Some(slot.at);
            }
            self.heap.pop();
        }
        None
    }
}
