//! Deterministic deadline queue driving the device's periodic tasks.
//!
//! Deadlines are simulated guest nanoseconds. Events with equal deadlines fire in the order they
//! were scheduled, so a run is fully reproducible from the sequence of host calls.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

pub const NS_PER_MS: u64 = 1_000_000;

/// Periodic tasks owned by the device model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceTimer {
    DataGeneration,
    RemoteWakeup,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimerEvent<T> {
    pub id: TimerId,
    pub deadline_ns: u64,
    pub payload: T,
}

#[derive(Debug)]
pub struct TimerQueue<T> {
    heap: BinaryHeap<Reverse<(u64, u64)>>,
    pending: HashMap<u64, T>,
    next_id: u64,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn schedule(&mut self, deadline_ns: u64, payload: T) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Reverse((deadline_ns, id)));
        self.pending.insert(id, payload);
        TimerId(id)
    }

    /// Cancels a pending timer. Cancelling a timer that already fired or was already cancelled
    /// is a no-op and returns `false`.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        if self.pending.remove(&id.0).is_none() {
            return false;
        }
        // Cancelled entries stay in the heap until they surface; drop them in bulk once they
        // outnumber live timers.
        if self.heap.len() > 2 * self.pending.len() + 16 {
            let pending = &self.pending;
            self.heap.retain(|Reverse((_, id))| pending.contains_key(id));
        }
        true
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.pending.contains_key(&id.0)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn next_deadline(&mut self) -> Option<u64> {
        self.discard_cancelled();
        self.heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Removes and returns the earliest event whose deadline is `<= now_ns`.
    pub fn pop_due(&mut self, now_ns: u64) -> Option<TimerEvent<T>> {
        self.discard_cancelled();
        let Reverse((deadline_ns, id)) = *self.heap.peek()?;
        if deadline_ns > now_ns {
            return None;
        }
        self.heap.pop();
        let payload = self.pending.remove(&id)?;
        Some(TimerEvent {
            id: TimerId(id),
            deadline_ns,
            payload,
        })
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse((_, id))) = self.heap.peek() {
            if self.pending.contains_key(id) {
                break;
            }
            self.heap.pop();
        }
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
