//! Per-session device state, mutated only by control requests and reset.

use std::collections::BTreeSet;

use bitflags::bitflags;

use crate::endpoint::EndpointAddress;
use crate::usb::UsbSpeed;

bitflags! {
    /// Device GET_STATUS word.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DeviceStatus: u16 {
        const SELF_POWERED = 1 << 0;
        const REMOTE_WAKEUP = 1 << 1;
    }
}

/// U1/U2 exit latencies recorded from the SuperSpeed SET_SEL request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExitLatency {
    pub u1_sel: u8,
    pub u1_pel: u8,
    pub u2_sel: u16,
    pub u2_pel: u16,
}

impl ExitLatency {
    pub fn from_payload(data: &[u8; 6]) -> Self {
        Self {
            u1_sel: data[0],
            u1_pel: data[1],
            u2_sel: u16::from_le_bytes([data[2], data[3]]),
            u2_pel: u16::from_le_bytes([data[4], data[5]]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    speed: UsbSpeed,
    pub attached: bool,
    pub address: u8,
    pub configuration: u8,
    pub remote_wakeup_enabled: bool,
    pub exit_latency: Option<ExitLatency>,
    halted: BTreeSet<EndpointAddress>,
    alternates: Vec<u8>,
}

impl DeviceState {
    pub fn new(speed: UsbSpeed, interface_count: u8) -> Self {
        Self {
            speed,
            attached: false,
            address: 0,
            configuration: 0,
            remote_wakeup_enabled: false,
            exit_latency: None,
            halted: BTreeSet::new(),
            alternates: vec![0; interface_count as usize],
        }
    }

    /// Negotiated at attach time and fixed for the session.
    pub fn speed(&self) -> UsbSpeed {
        self.speed
    }

    /// Restores bus-reset defaults. Speed and attachment are properties of the link, not of the
    /// device's logical state, and survive.
    pub fn reset(&mut self) {
        self.address = 0;
        self.configuration = 0;
        self.remote_wakeup_enabled = false;
        self.exit_latency = None;
        self.halted.clear();
        self.alternates.iter_mut().for_each(|alt| *alt = 0);
    }

    pub fn status(&self) -> DeviceStatus {
        let mut status = DeviceStatus::empty();
        status.set(DeviceStatus::REMOTE_WAKEUP, self.remote_wakeup_enabled);
        status
    }

    pub fn is_halted(&self, ep: EndpointAddress) -> bool {
        self.halted.contains(&ep)
    }

    pub fn set_halted(&mut self, ep: EndpointAddress, halted: bool) {
        if halted {
            self.halted.insert(ep);
        } else {
            self.halted.remove(&ep);
        }
    }

    pub fn interface_count(&self) -> u8 {
        self.alternates.len() as u8
    }

    pub fn alternate(&self, interface: u8) -> Option<u8> {
        self.alternates.get(interface as usize).copied()
    }

    pub fn alternates(&self) -> &[u8] {
        &self.alternates
    }

    pub(crate) fn set_alternate(&mut self, interface: u8, value: u8) {
        if let Some(slot) = self.alternates.get_mut(interface as usize) {
            *slot = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::Direction;

    #[test]
    fn reset_restores_defaults_but_keeps_link() {
        let ep = EndpointAddress::new(1, Direction::In);
        let mut state = DeviceState::new(UsbSpeed::Super, 3);
        state.attached = true;
        state.address = 7;
        state.configuration = 1;
        state.remote_wakeup_enabled = true;
        state.exit_latency = Some(ExitLatency::default());
        state.set_halted(ep, true);
        state.set_alternate(2, 1);

        state.reset();

        assert!(state.attached);
        assert_eq!(state.speed(), UsbSpeed::Super);
        assert_eq!(state.address, 0);
        assert_eq!(state.configuration, 0);
        assert!(!state.remote_wakeup_enabled);
        assert_eq!(state.exit_latency, None);
        assert!(!state.is_halted(ep));
        assert_eq!(state.alternates(), &[0, 0, 0]);
    }

    #[test]
    fn status_reflects_remote_wakeup() {
        let mut state = DeviceState::new(UsbSpeed::Full, 1);
        assert_eq!(state.status().bits(), 0);
        state.remote_wakeup_enabled = true;
        assert_eq!(state.status().bits(), 0x0002);
    }

    #[test]
    fn exit_latency_payload_is_little_endian() {
        let lat = ExitLatency::from_payload(&[0x0a, 0x0b, 0x34, 0x12, 0x78, 0x56]);
        assert_eq!(lat.u1_sel, 0x0a);
        assert_eq!(lat.u1_pel, 0x0b);
        assert_eq!(lat.u2_sel, 0x1234);
        assert_eq!(lat.u2_pel, 0x5678);
    }
}
