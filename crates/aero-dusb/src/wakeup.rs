//! Remote-wakeup scheduler.
//!
//! The task runs for as long as the device is attached and reschedules on every firing until the
//! next deadline no longer fits the clock. Whether a firing is visible to the host depends only
//! on the remote-wakeup enable flag and attachment.

use tracing::debug;

use crate::endpoint::EndpointAddress;
use crate::state::DeviceState;
use crate::timer::{DeviceTimer, TimerId, TimerQueue};

/// A wakeup request raised by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WakeupSignal {
    pub endpoint: EndpointAddress,
    pub at_ns: u64,
}

/// Host-side receiver of remote-wakeup signals.
pub trait WakeupSink {
    fn remote_wakeup(&mut self, signal: WakeupSignal);
}

impl WakeupSink for Vec<WakeupSignal> {
    fn remote_wakeup(&mut self, signal: WakeupSignal) {
        self.push(signal);
    }
}

/// Sink for hosts that do not model suspend/resume.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreWakeup;

impl WakeupSink for IgnoreWakeup {
    fn remote_wakeup(&mut self, _signal: WakeupSignal) {}
}

#[derive(Debug)]
pub struct WakeupScheduler {
    interval_ns: u64,
    target: Option<EndpointAddress>,
    timer_id: Option<TimerId>,
    next_deadline_ns: Option<u64>,
    emitted: u64,
}

impl WakeupScheduler {
    pub fn new(interval_ns: u64, target: Option<EndpointAddress>) -> Self {
        Self {
            interval_ns,
            target,
            timer_id: None,
            next_deadline_ns: None,
            emitted: 0,
        }
    }

    pub fn target(&self) -> Option<EndpointAddress> {
        self.target
    }

    pub fn is_armed(&self) -> bool {
        self.timer_id.is_some()
    }

    pub fn next_deadline_ns(&self) -> Option<u64> {
        self.next_deadline_ns
    }

    /// Number of signals actually delivered to a sink.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn start(&mut self, now_ns: u64, queue: &mut TimerQueue<DeviceTimer>) {
        if self.timer_id.is_some() {
            return;
        }
        let deadline = now_ns.saturating_add(self.interval_ns);
        self.timer_id = Some(queue.schedule(deadline, DeviceTimer::RemoteWakeup));
        self.next_deadline_ns = Some(deadline);
    }

    pub fn stop(&mut self, queue: &mut TimerQueue<DeviceTimer>) {
        if let Some(id) = self.timer_id.take() {
            queue.cancel(id);
        }
        self.next_deadline_ns = None;
    }

    /// Reschedules unless the next deadline overflows the clock, then emits a signal if the
    /// device allows it.
    pub fn handle_timer_event(
        &mut self,
        id: TimerId,
        at_ns: u64,
        state: &DeviceState,
        queue: &mut TimerQueue<DeviceTimer>,
        sink: &mut dyn WakeupSink,
    ) -> bool {
        if self.timer_id != Some(id) {
            return false;
        }

        let deadline = self.next_deadline_ns.unwrap_or(at_ns);
        match deadline.checked_add(self.interval_ns) {
            Some(next) if self.interval_ns > 0 => {
                self.timer_id = Some(queue.schedule(next, DeviceTimer::RemoteWakeup));
                self.next_deadline_ns = Some(next);
            }
            _ => {
                debug!(deadline_ns = deadline, "remote wakeup task reached end of time");
                self.timer_id = None;
                self.next_deadline_ns = None;
            }
        }

        if !state.remote_wakeup_enabled || !state.attached {
            return false;
        }
        let Some(endpoint) = self.target else {
            return false;
        };

        debug!(ep = %endpoint, at_ns, "signalling remote wakeup");
        sink.remote_wakeup(WakeupSignal { endpoint, at_ns });
        self.emitted += 1;
        true
    }
}
