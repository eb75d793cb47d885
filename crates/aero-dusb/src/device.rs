//! The device model seen by a host controller.
//!
//! [`DusbDevice`] owns one session per attachment. The session holds the negotiated profile, the
//! endpoint registry, mutable device state, the IN mailboxes and the two periodic tasks, all
//! driven by the session's own [`TimerQueue`]. The host advances simulated time explicitly with
//! [`DusbDevice::advance_to`].

use tracing::{debug, info, warn};

use crate::alt_setting::{any_producing, producing_targets, AltTransition};
use crate::buffers::EndpointBuffers;
use crate::config::DusbConfig;
use crate::control::{self, Dispatched};
use crate::descriptors::{DescriptorContext, DescriptorSource, StandardDescriptors};
use crate::endpoint::{EndpointAddress, EndpointRegistry};
use crate::error::{AttachError, ConfigError};
use crate::generator::DataGenerator;
use crate::profile::DeviceProfile;
use crate::state::DeviceState;
use crate::timer::{DeviceTimer, TimerQueue};
use crate::transfer::{handle_transfer, DataTransfer};
use crate::usb::{ControlResponse, SetupPacket, UsbHandshake, UsbSpeed};
use crate::wakeup::{WakeupScheduler, WakeupSink};

/// Operations a host controller performs on an attached USB device model.
pub trait UsbDeviceModel {
    /// Negotiates the link speed against the host port and starts a new session.
    fn attach(&mut self, host_speed: UsbSpeed, now_ns: u64) -> Result<UsbSpeed, AttachError>;

    /// Handles a control transfer on endpoint 0. `data` is the OUT data stage, if any.
    fn handle_control_request(&mut self, setup: SetupPacket, data: Option<&[u8]>)
        -> ControlResponse;

    /// Handles one transaction on a non-control endpoint.
    fn handle_data(&mut self, endpoint: u8, transfer: DataTransfer<'_>) -> UsbHandshake;

    /// Bus reset.
    fn handle_reset(&mut self);
}

#[derive(Debug)]
struct Session {
    profile: DeviceProfile,
    registry: EndpointRegistry,
    state: DeviceState,
    buffers: EndpointBuffers,
    generator: DataGenerator,
    wakeup: WakeupScheduler,
    timers: TimerQueue<DeviceTimer>,
    now_ns: u64,
}

impl Session {
    fn apply_transition(&mut self, t: AltTransition) {
        if t.left_producing() {
            for ep in self.registry.in_endpoints_of(t.interface) {
                self.buffers.clear(ep);
            }
        }
        if t.was_producing != t.now_producing {
            self.generator
                .set_targets(producing_targets(&self.state, &self.profile));
        }

        if t.now_producing {
            if self.generator.arm(self.now_ns, &mut self.timers) {
                debug!(
                    interface = t.interface,
                    deadline_ns = ?self.generator.next_deadline_ns(),
                    "data generator armed"
                );
            }
        } else if !any_producing(&self.state, &self.profile) && self.generator.cancel(&mut self.timers)
        {
            debug!(interface = t.interface, "data generator stopped");
        }
    }

    fn reset(&mut self) {
        self.state.reset();
        self.buffers.clear_all();
        self.generator.reset(&mut self.timers);
    }
}

pub struct DusbDevice {
    config: DusbConfig,
    descriptors: Box<dyn DescriptorSource>,
    session: Option<Session>,
}

impl DusbDevice {
    pub fn new(config: DusbConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            descriptors: Box::new(StandardDescriptors),
            session: None,
        })
    }

    /// Replaces the descriptor source consulted for retrieval requests.
    pub fn with_descriptor_source(mut self, source: Box<dyn DescriptorSource>) -> Self {
        self.descriptors = source;
        self
    }

    pub fn config(&self) -> &DusbConfig {
        &self.config
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    pub fn speed(&self) -> Option<UsbSpeed> {
        self.session.as_ref().map(|s| s.state.speed())
    }

    pub fn state(&self) -> Option<&DeviceState> {
        self.session.as_ref().map(|s| &s.state)
    }

    pub fn profile(&self) -> Option<&DeviceProfile> {
        self.session.as_ref().map(|s| &s.profile)
    }

    pub fn registry(&self) -> Option<&EndpointRegistry> {
        self.session.as_ref().map(|s| &s.registry)
    }

    pub fn alternate(&self, interface: u8) -> Option<u8> {
        self.state()?.alternate(interface)
    }

    pub fn generator(&self) -> Option<&DataGenerator> {
        self.session.as_ref().map(|s| &s.generator)
    }

    pub fn wakeup(&self) -> Option<&WakeupScheduler> {
        self.session.as_ref().map(|s| &s.wakeup)
    }

    pub fn generator_armed(&self) -> bool {
        self.generator().is_some_and(DataGenerator::is_armed)
    }

    pub fn wakeup_armed(&self) -> bool {
        self.wakeup().is_some_and(WakeupScheduler::is_armed)
    }

    /// Bytes waiting in the mailbox of `ep`.
    pub fn buffered_len(&self, ep: EndpointAddress) -> usize {
        self.session.as_ref().map_or(0, |s| s.buffers.len(ep))
    }

    pub fn now_ns(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.now_ns)
    }

    pub fn next_timer_deadline(&mut self) -> Option<u64> {
        self.session.as_mut()?.timers.next_deadline()
    }

    /// Fires every timer due at or before `now_ns`, in deadline order.
    pub fn advance_to(&mut self, now_ns: u64, sink: &mut dyn WakeupSink) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        if now_ns < s.now_ns {
            warn!(now_ns, current_ns = s.now_ns, "ignoring attempt to move device time backwards");
            return;
        }

        while let Some(event) = s.timers.pop_due(now_ns) {
            s.now_ns = event.deadline_ns;
            match event.payload {
                DeviceTimer::DataGeneration => {
                    s.generator.handle_timer_event(
                        event.id,
                        event.deadline_ns,
                        &mut s.timers,
                        &mut s.buffers,
                    );
                }
                DeviceTimer::RemoteWakeup => {
                    s.wakeup.handle_timer_event(
                        event.id,
                        event.deadline_ns,
                        &s.state,
                        &mut s.timers,
                        sink,
                    );
                }
            }
        }
        s.now_ns = now_ns;
    }

    /// Ends the session. Both periodic tasks are cancelled and all state is dropped.
    pub fn detach(&mut self) {
        let Some(mut s) = self.session.take() else {
            return;
        };
        s.generator.cancel(&mut s.timers);
        s.wakeup.stop(&mut s.timers);
        info!(speed = %s.state.speed(), "dusb device detached");
    }
}

impl UsbDeviceModel for DusbDevice {
    fn attach(&mut self, host_speed: UsbSpeed, now_ns: u64) -> Result<UsbSpeed, AttachError> {
        if let Some(s) = &self.session {
            return Err(AttachError::AlreadyAttached(s.state.speed()));
        }

        let speed = UsbSpeed::negotiate(self.config.max_speed, host_speed);
        let profile = DeviceProfile::select(self.config.layout, speed)
            .map_err(|source| AttachError::Profile { speed, source })?;
        let registry = EndpointRegistry::build(&profile)
            .map_err(|source| AttachError::Profile { speed, source })?;

        let mut state = DeviceState::new(speed, profile.interface_count());
        state.attached = true;

        let mut timers = TimerQueue::new();
        let mut wakeup =
            WakeupScheduler::new(self.config.wakeup_interval_ns(), registry.wakeup_target());
        wakeup.start(now_ns, &mut timers);

        info!(
            %speed,
            %host_speed,
            interfaces = profile.interface_count(),
            "dusb device attached"
        );

        self.session = Some(Session {
            generator: DataGenerator::new(self.config.data_interval_ns()),
            profile,
            registry,
            state,
            buffers: EndpointBuffers::new(),
            wakeup,
            timers,
            now_ns,
        });
        Ok(speed)
    }

    fn handle_control_request(
        &mut self,
        setup: SetupPacket,
        data: Option<&[u8]>,
    ) -> ControlResponse {
        let Some(s) = self.session.as_mut() else {
            debug!(request = setup.request, "control request before attach");
            return ControlResponse::Stall;
        };

        let ctx = DescriptorContext {
            profile: &s.profile,
            state: &s.state,
            identity: &self.config.identity,
        };
        if let Some(mut payload) = self.descriptors.handle_retrieval(setup, &ctx) {
            payload.truncate(setup.length as usize);
            debug!(
                request = setup.request,
                value = setup.value,
                index = setup.index,
                len = payload.len(),
                "descriptor request answered"
            );
            return ControlResponse::Data(payload);
        }

        match control::dispatch(&mut s.state, &s.profile, &s.registry, setup, data) {
            Ok(outcome) => {
                debug!(
                    request = setup.request,
                    value = setup.value,
                    index = setup.index,
                    "control request accepted"
                );
                match outcome {
                    Dispatched::Data(mut payload) => {
                        payload.truncate(setup.length as usize);
                        ControlResponse::Data(payload)
                    }
                    Dispatched::Ack => ControlResponse::Ack,
                    Dispatched::AlternateChanged(t) => {
                        s.apply_transition(t);
                        ControlResponse::Ack
                    }
                }
            }
            Err(stall) => {
                debug!(
                    request_type = setup.request_type,
                    direction = ?setup.direction(),
                    request = setup.request,
                    value = setup.value,
                    index = setup.index,
                    reason = stall.0,
                    "control request stalled"
                );
                ControlResponse::Stall
            }
        }
    }

    fn handle_data(&mut self, endpoint: u8, transfer: DataTransfer<'_>) -> UsbHandshake {
        let Some(s) = self.session.as_mut() else {
            debug!(endpoint, "transfer before attach");
            return UsbHandshake::Stall;
        };
        handle_transfer(&s.state, &s.registry, &mut s.buffers, endpoint, transfer)
    }

    fn handle_reset(&mut self) {
        if let Some(s) = self.session.as_mut() {
            s.reset();
            debug!("dusb device reset");
        }
    }
}
