//! Descriptor profile selection: the static interface/alternate/endpoint shape for a speed.
//!
//! A profile is chosen once at attach time from a [`ProfileKind`] and the negotiated
//! [`UsbSpeed`]. It is read-only afterwards; the byte encoding lives in
//! [`crate::descriptors`] and reachability queries in [`crate::endpoint::EndpointRegistry`].

use serde::{Deserialize, Serialize};

use crate::endpoint::{EndpointAddress, EndpointDescriptor, SuperSpeedCompanion, TransferType};
use crate::error::ProfileError;
use crate::usb::{Direction, UsbSpeed};

/// Vendor-specific interface class used by every interface of this device.
pub const INTERFACE_CLASS_VENDOR: u8 = 0xff;

/// Each triplet interface consumes three endpoint numbers, so five interfaces exhaust 1..=15.
pub const MAX_TRIPLET_INTERFACES: u8 = 5;

const SS_BULK_MAX_BURST: u8 = 15;
const SS_BULK_MAX_STREAMS_EXP: u8 = 4;

/// Layout of interfaces and alternate settings exposed by the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProfileKind {
    /// Three interfaces with one endpoint per alternate:
    /// interrupt IN (ep 1), bulk OUT/IN (ep 3), isochronous IN (ep 5).
    #[default]
    PerClass,
    /// `interfaces` interfaces; alt 0 exposes an interrupt/isochronous/bulk OUT triplet and
    /// alt 1 the matching IN triplet.
    Triplet { interfaces: u8 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlternateSetting {
    pub value: u8,
    pub endpoints: Vec<EndpointDescriptor>,
}

impl AlternateSetting {
    /// The producing alternate exposes at least one endpoint and only device-to-host ones.
    pub fn is_producing(&self) -> bool {
        !self.endpoints.is_empty() && self.endpoints.iter().all(|ep| ep.address.is_in())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceShape {
    pub number: u8,
    pub class: u8,
    pub alternates: Vec<AlternateSetting>,
}

impl InterfaceShape {
    pub fn alternate_count(&self) -> u8 {
        self.alternates.len() as u8
    }

    pub fn alternate(&self, value: u8) -> Option<&AlternateSetting> {
        self.alternates.iter().find(|alt| alt.value == value)
    }

    pub fn producing_alternate(&self) -> Option<u8> {
        self.alternates
            .iter()
            .find(|alt| alt.is_producing())
            .map(|alt| alt.value)
    }

    pub fn is_producing(&self, value: u8) -> bool {
        self.alternate(value).is_some_and(AlternateSetting::is_producing)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceProfile {
    pub speed: UsbSpeed,
    pub kind: ProfileKind,
    pub interfaces: Vec<InterfaceShape>,
}

impl DeviceProfile {
    pub fn select(kind: ProfileKind, speed: UsbSpeed) -> Result<Self, ProfileError> {
        let interfaces = match kind {
            ProfileKind::PerClass => per_class_interfaces(speed),
            ProfileKind::Triplet { interfaces } => {
                if interfaces == 0 || interfaces > MAX_TRIPLET_INTERFACES {
                    return Err(ProfileError::InterfaceCount {
                        requested: interfaces,
                        max: MAX_TRIPLET_INTERFACES,
                    });
                }
                (0..interfaces)
                    .map(|i| triplet_interface(i, speed))
                    .collect()
            }
        };
        Ok(Self {
            speed,
            kind,
            interfaces,
        })
    }

    pub fn interface_count(&self) -> u8 {
        self.interfaces.len() as u8
    }

    pub fn interface(&self, number: u8) -> Option<&InterfaceShape> {
        self.interfaces.get(number as usize)
    }

    pub fn alternate(&self, interface: u8, value: u8) -> Option<&AlternateSetting> {
        self.interface(interface)?.alternate(value)
    }

    pub fn alternate_count(&self, interface: u8) -> Option<u8> {
        self.interface(interface).map(InterfaceShape::alternate_count)
    }
}

/// Speed-dependent attributes for one endpoint.
pub fn endpoint_for_speed(
    interface: u8,
    number: u8,
    direction: Direction,
    transfer: TransferType,
    speed: UsbSpeed,
) -> EndpointDescriptor {
    // Full-speed `bInterval` is in frames; high speed and up use the 2^(n-1) microframe form.
    let (max_packet_size, interval) = match (transfer, speed) {
        (TransferType::Control, UsbSpeed::Super) => (512, 0),
        (TransferType::Control, _) => (64, 0),
        (TransferType::Interrupt, UsbSpeed::Full) => (64, 1),
        (TransferType::Interrupt, _) => (1024, 4),
        (TransferType::Isochronous, UsbSpeed::Full) => (1023, 1),
        (TransferType::Isochronous, _) => (1024, 1),
        (TransferType::Bulk, UsbSpeed::Full) => (64, 0),
        (TransferType::Bulk, UsbSpeed::High) => (512, 0),
        (TransferType::Bulk, UsbSpeed::Super) => (1024, 0),
    };

    let companion = speed.is_super_speed().then(|| match transfer {
        TransferType::Bulk => SuperSpeedCompanion {
            max_burst: SS_BULK_MAX_BURST,
            max_streams_exp: SS_BULK_MAX_STREAMS_EXP,
            bytes_per_interval: 0,
        },
        _ => SuperSpeedCompanion {
            max_burst: 0,
            max_streams_exp: 0,
            bytes_per_interval: max_packet_size,
        },
    });

    EndpointDescriptor {
        interface,
        address: EndpointAddress::new(number, direction),
        transfer,
        max_packet_size,
        interval,
        companion,
    }
}

fn per_class_interfaces(speed: UsbSpeed) -> Vec<InterfaceShape> {
    let iface = |number: u8, alt0: Vec<EndpointDescriptor>, alt1: Vec<EndpointDescriptor>| {
        InterfaceShape {
            number,
            class: INTERFACE_CLASS_VENDOR,
            alternates: vec![
                AlternateSetting {
                    value: 0,
                    endpoints: alt0,
                },
                AlternateSetting {
                    value: 1,
                    endpoints: alt1,
                },
            ],
        }
    };

    vec![
        iface(
            0,
            Vec::new(),
            vec![endpoint_for_speed(0, 1, Direction::In, TransferType::Interrupt, speed)],
        ),
        iface(
            1,
            vec![endpoint_for_speed(1, 3, Direction::Out, TransferType::Bulk, speed)],
            vec![endpoint_for_speed(1, 3, Direction::In, TransferType::Bulk, speed)],
        ),
        iface(
            2,
            Vec::new(),
            vec![endpoint_for_speed(2, 5, Direction::In, TransferType::Isochronous, speed)],
        ),
    ]
}

fn triplet_interface(number: u8, speed: UsbSpeed) -> InterfaceShape {
    let base = number * 3 + 1;
    let triplet = |direction: Direction| {
        vec![
            endpoint_for_speed(number, base, direction, TransferType::Interrupt, speed),
            endpoint_for_speed(number, base + 1, direction, TransferType::Isochronous, speed),
            endpoint_for_speed(number, base + 2, direction, TransferType::Bulk, speed),
        ]
    };

    InterfaceShape {
        number,
        class: INTERFACE_CLASS_VENDOR,
        alternates: vec![
            AlternateSetting {
                value: 0,
                endpoints: triplet(Direction::Out),
            },
            AlternateSetting {
                value: 1,
                endpoints: triplet(Direction::In),
            },
        ],
    }
}
