//! Endpoint descriptors and the registry that indexes them by interface and alternate setting.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ProfileError;
use crate::profile::DeviceProfile;
use crate::usb::Direction;

/// Highest endpoint number addressable on the bus (`bEndpointAddress` bits 3:0).
pub const MAX_ENDPOINT_NUMBER: u8 = 15;

/// `bEndpointAddress`: endpoint number plus direction bit 7.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointAddress(u8);

impl EndpointAddress {
    pub const fn new(number: u8, direction: Direction) -> Self {
        let dir = match direction {
            Direction::In => 0x80,
            Direction::Out => 0x00,
        };
        Self(dir | (number & 0x0f))
    }

    pub const fn from_raw(raw: u8) -> Self {
        Self(raw & 0x8f)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn number(self) -> u8 {
        self.0 & 0x0f
    }

    pub const fn direction(self) -> Direction {
        if self.0 & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub const fn is_in(self) -> bool {
        self.0 & 0x80 != 0
    }

    pub const fn is_control(self) -> bool {
        self.number() == 0
    }
}

impl fmt::Debug for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EndpointAddress({:#04x})", self.0)
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.is_in() { "IN" } else { "OUT" };
        write!(f, "ep{} {dir}", self.number())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl TransferType {
    /// `bmAttributes` bits 1:0.
    pub const fn attributes(self) -> u8 {
        match self {
            TransferType::Control => 0x00,
            TransferType::Isochronous => 0x01,
            TransferType::Bulk => 0x02,
            TransferType::Interrupt => 0x03,
        }
    }
}

/// SuperSpeed endpoint companion attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuperSpeedCompanion {
    /// Packets per burst minus one (`bMaxBurst`).
    pub max_burst: u8,
    /// Log2 of the supported stream count; bulk endpoints only.
    pub max_streams_exp: u8,
    /// Bytes per service interval; periodic endpoints only.
    pub bytes_per_interval: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub interface: u8,
    pub address: EndpointAddress,
    pub transfer: TransferType,
    pub max_packet_size: u16,
    /// `bInterval` as encoded for the negotiated speed; 0 for bulk.
    pub interval: u8,
    pub companion: Option<SuperSpeedCompanion>,
}

#[derive(Debug, Clone)]
struct EndpointHome {
    interface: u8,
    alternates: Vec<u8>,
}

/// Index over a [`DeviceProfile`] answering reachability questions for the transfer engine.
///
/// Every endpoint address is owned by exactly one interface; the alternates that expose it are
/// recorded so membership is checked against the active alternate rather than the raw number.
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    by_alternate: BTreeMap<(u8, u8), Vec<EndpointDescriptor>>,
    homes: BTreeMap<EndpointAddress, EndpointHome>,
}

impl EndpointRegistry {
    pub fn build(profile: &DeviceProfile) -> Result<Self, ProfileError> {
        let mut by_alternate = BTreeMap::new();
        let mut homes: BTreeMap<EndpointAddress, EndpointHome> = BTreeMap::new();

        for iface in &profile.interfaces {
            for alt in &iface.alternates {
                for ep in &alt.endpoints {
                    let number = ep.address.number();
                    if number == 0 || number > MAX_ENDPOINT_NUMBER {
                        return Err(ProfileError::EndpointNumberOutOfRange { number });
                    }
                    let home = homes.entry(ep.address).or_insert_with(|| EndpointHome {
                        interface: iface.number,
                        alternates: Vec::new(),
                    });
                    if home.interface != iface.number {
                        return Err(ProfileError::SharedEndpoint {
                            address: ep.address.raw(),
                            first: home.interface,
                            second: iface.number,
                        });
                    }
                    if !home.alternates.contains(&alt.value) {
                        home.alternates.push(alt.value);
                    }
                }
                by_alternate.insert((iface.number, alt.value), alt.endpoints.clone());
            }
        }

        Ok(Self {
            by_alternate,
            homes,
        })
    }

    /// Endpoints exposed by `(interface, alternate)`; empty for unknown pairs.
    pub fn endpoints(&self, interface: u8, alternate: u8) -> &[EndpointDescriptor] {
        self.by_alternate
            .get(&(interface, alternate))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, address: EndpointAddress) -> bool {
        self.homes.contains_key(&address)
    }

    pub fn owning_interface(&self, address: EndpointAddress) -> Option<u8> {
        self.homes.get(&address).map(|home| home.interface)
    }

    pub fn is_member(&self, address: EndpointAddress, interface: u8, alternate: u8) -> bool {
        self.homes
            .get(&address)
            .is_some_and(|home| home.interface == interface && home.alternates.contains(&alternate))
    }

    pub fn addresses(&self) -> impl Iterator<Item = EndpointAddress> + '_ {
        self.homes.keys().copied()
    }

    /// Device-to-host endpoints that belong to `interface` under any alternate.
    pub fn in_endpoints_of(&self, interface: u8) -> impl Iterator<Item = EndpointAddress> + '_ {
        self.homes
            .iter()
            .filter(move |(addr, home)| addr.is_in() && home.interface == interface)
            .map(|(addr, _)| *addr)
    }

    /// Endpoint that remote-wakeup signals are addressed to: the lowest-numbered interrupt IN
    /// endpoint, falling back to the lowest-numbered IN endpoint.
    pub fn wakeup_target(&self) -> Option<EndpointAddress> {
        let mut interrupt_in = None;
        let mut any_in = None;
        for eps in self.by_alternate.values() {
            for ep in eps.iter().filter(|ep| ep.address.is_in()) {
                let lower = |cur: Option<EndpointAddress>| {
                    cur.map_or(true, |c| ep.address.number() < c.number())
                };
                if ep.transfer == TransferType::Interrupt && lower(interrupt_in) {
                    interrupt_in = Some(ep.address);
                }
                if lower(any_in) {
                    any_in = Some(ep.address);
                }
            }
        }
        interrupt_in.or(any_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileKind;
    use crate::usb::UsbSpeed;

    #[test]
    fn address_encoding() {
        let ep = EndpointAddress::new(3, Direction::In);
        assert_eq!(ep.raw(), 0x83);
        assert_eq!(ep.number(), 3);
        assert!(ep.is_in());
        assert_eq!(EndpointAddress::from_raw(0x03).direction(), Direction::Out);
        assert_eq!(EndpointAddress::from_raw(0xf3).raw(), 0x83);
    }

    #[test]
    fn per_class_membership_follows_alternates() {
        let profile = DeviceProfile::select(ProfileKind::PerClass, UsbSpeed::Full).unwrap();
        let registry = EndpointRegistry::build(&profile).unwrap();

        let bulk_in = EndpointAddress::new(3, Direction::In);
        let bulk_out = EndpointAddress::new(3, Direction::Out);
        assert_eq!(registry.owning_interface(bulk_in), Some(1));
        assert_eq!(registry.owning_interface(bulk_out), Some(1));
        assert!(registry.is_member(bulk_out, 1, 0));
        assert!(!registry.is_member(bulk_out, 1, 1));
        assert!(registry.is_member(bulk_in, 1, 1));
        assert!(!registry.is_member(bulk_in, 0, 1));
        assert!(registry.endpoints(0, 0).is_empty());
        assert_eq!(registry.endpoints(0, 1).len(), 1);
        assert_eq!(
            registry.wakeup_target(),
            Some(EndpointAddress::new(1, Direction::In))
        );
    }
}
