//! Periodic data generator filling IN endpoint mailboxes in round-robin order.

use tracing::{debug, trace};

use crate::buffers::EndpointBuffers;
use crate::endpoint::EndpointAddress;
use crate::timer::{DeviceTimer, TimerId, TimerQueue};

/// An IN endpoint the generator writes to, with the payload size it produces for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeneratorTarget {
    pub address: EndpointAddress,
    pub len: usize,
}

/// Deterministic endpoint payload: byte 0 is the endpoint number, byte `i` is
/// `(i + generation) mod 256`.
pub fn synthesize_payload(endpoint_number: u8, len: usize, generation: u32) -> Vec<u8> {
    (0..len)
        .map(|i| {
            if i == 0 {
                endpoint_number
            } else {
                (i as u32).wrapping_add(generation) as u8
            }
        })
        .collect()
}

#[derive(Debug)]
pub struct DataGenerator {
    interval_ns: u64,
    timer_id: Option<TimerId>,
    next_deadline_ns: Option<u64>,
    targets: Vec<GeneratorTarget>,
    cursor: usize,
    generation: u32,
}

impl DataGenerator {
    pub fn new(interval_ns: u64) -> Self {
        Self {
            interval_ns,
            timer_id: None,
            next_deadline_ns: None,
            targets: Vec::new(),
            cursor: 0,
            generation: 0,
        }
    }

    pub fn interval_ns(&self) -> u64 {
        self.interval_ns
    }

    pub fn is_armed(&self) -> bool {
        self.timer_id.is_some()
    }

    pub fn next_deadline_ns(&self) -> Option<u64> {
        self.next_deadline_ns
    }

    pub fn targets(&self) -> &[GeneratorTarget] {
        &self.targets
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Replaces the round-robin target list. The cursor keeps its position modulo the new
    /// length so a running cycle is not restarted by an unrelated interface change.
    pub fn set_targets(&mut self, targets: Vec<GeneratorTarget>) {
        self.cursor = match targets.len() {
            0 => 0,
            n => self.cursor % n,
        };
        self.targets = targets;
    }

    /// Arms the task at `now_ns + interval` unless it is already running.
    pub fn arm(&mut self, now_ns: u64, queue: &mut TimerQueue<DeviceTimer>) -> bool {
        if self.timer_id.is_some() {
            return false;
        }
        let deadline = now_ns.saturating_add(self.interval_ns);
        self.timer_id = Some(queue.schedule(deadline, DeviceTimer::DataGeneration));
        self.next_deadline_ns = Some(deadline);
        true
    }

    /// Stops the task. Cancelling a stopped generator is a no-op.
    pub fn cancel(&mut self, queue: &mut TimerQueue<DeviceTimer>) -> bool {
        let Some(id) = self.timer_id.take() else {
            return false;
        };
        queue.cancel(id);
        self.next_deadline_ns = None;
        self.cursor = 0;
        true
    }

    pub fn reset(&mut self, queue: &mut TimerQueue<DeviceTimer>) {
        self.cancel(queue);
        self.targets.clear();
        self.cursor = 0;
        self.generation = 0;
    }

    /// Handles one firing: reschedules, then fills the next target's mailbox. A task whose next
    /// deadline would not fit in `u64` is disarmed instead of rescheduled.
    ///
    /// Returns the endpoint that was filled. Events for a timer id other than the armed one are
    /// stale and ignored.
    pub fn handle_timer_event(
        &mut self,
        id: TimerId,
        at_ns: u64,
        queue: &mut TimerQueue<DeviceTimer>,
        buffers: &mut EndpointBuffers,
    ) -> Option<EndpointAddress> {
        if self.timer_id != Some(id) {
            return None;
        }

        let deadline = self.next_deadline_ns.unwrap_or(at_ns);
        match deadline.checked_add(self.interval_ns) {
            Some(next) if self.interval_ns > 0 => {
                self.timer_id = Some(queue.schedule(next, DeviceTimer::DataGeneration));
                self.next_deadline_ns = Some(next);
            }
            _ => {
                // The clock cannot represent the next deadline; this firing is the last one.
                debug!(deadline_ns = deadline, "data generator reached end of time");
                self.timer_id = None;
                self.next_deadline_ns = None;
            }
        }

        if self.targets.is_empty() {
            return None;
        }
        let target = self.targets[self.cursor];
        let payload = synthesize_payload(target.address.number(), target.len, self.generation);
        let overwrote = buffers.fill(target.address, payload);
        trace!(
            ep = %target.address,
            len = target.len,
            generation = self.generation,
            overwrote,
            "generator filled endpoint"
        );

        self.cursor = (self.cursor + 1) % self.targets.len();
        self.generation = self.generation.wrapping_add(1);
        Some(target.address)
    }
}
