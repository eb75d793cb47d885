//! Descriptor retrieval.
//!
//! The control dispatcher offers every standard retrieval request (GET_DESCRIPTOR,
//! GET_CONFIGURATION, GET_INTERFACE) to a [`DescriptorSource`] first. [`StandardDescriptors`]
//! encodes the tables straight from the selected [`DeviceProfile`]; hosts with their own
//! descriptor repository can plug in a different source.

use crate::config::DeviceIdentity;
use crate::endpoint::{EndpointDescriptor, TransferType};
use crate::profile::DeviceProfile;
use crate::state::DeviceState;
use crate::usb::{SetupPacket, UsbSpeed, REQ_GET_CONFIGURATION, REQ_GET_DESCRIPTOR, REQ_GET_INTERFACE};

pub const DESC_DEVICE: u8 = 0x01;
pub const DESC_CONFIGURATION: u8 = 0x02;
pub const DESC_STRING: u8 = 0x03;
pub const DESC_INTERFACE: u8 = 0x04;
pub const DESC_ENDPOINT: u8 = 0x05;
pub const DESC_BOS: u8 = 0x0f;
pub const DESC_DEVICE_CAPABILITY: u8 = 0x10;
pub const DESC_SS_ENDPOINT_COMPANION: u8 = 0x30;

const CAP_USB20_EXTENSION: u8 = 0x02;
const CAP_SUPERSPEED_USB: u8 = 0x03;

const CONFIGURATION_VALUE: u8 = 1;
/// Bus powered, remote wakeup capable.
const CONFIG_ATTRIBUTES: u8 = 0xa0;
const CONFIG_MAX_POWER: u8 = 50;

const LANGID_EN_US: u16 = 0x0409;

/// Read-only view handed to a descriptor source.
#[derive(Clone, Copy, Debug)]
pub struct DescriptorContext<'a> {
    pub profile: &'a DeviceProfile,
    pub state: &'a DeviceState,
    pub identity: &'a DeviceIdentity,
}

pub trait DescriptorSource {
    /// Answers a standard retrieval request, or returns `None` to decline it.
    fn handle_retrieval(&self, setup: SetupPacket, ctx: &DescriptorContext<'_>) -> Option<Vec<u8>>;
}

/// Descriptor tables generated from the active profile and identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardDescriptors;

impl DescriptorSource for StandardDescriptors {
    fn handle_retrieval(&self, setup: SetupPacket, ctx: &DescriptorContext<'_>) -> Option<Vec<u8>> {
        match (setup.request_type, setup.request) {
            (0x80, REQ_GET_DESCRIPTOR) => {
                let desc_type = (setup.value >> 8) as u8;
                let index = (setup.value & 0xff) as u8;
                match desc_type {
                    DESC_DEVICE => Some(device_descriptor(ctx.profile.speed, ctx.identity).to_vec()),
                    DESC_CONFIGURATION if index == 0 => Some(configuration_descriptor(ctx.profile)),
                    DESC_STRING => string_descriptor(ctx.identity, index),
                    DESC_BOS if ctx.profile.speed.is_super_speed() => Some(bos_descriptor()),
                    _ => None,
                }
            }
            (0x80, REQ_GET_CONFIGURATION) => {
                (setup.value == 0 && setup.index == 0).then(|| vec![ctx.state.configuration])
            }
            (0x81, REQ_GET_INTERFACE) => {
                if setup.value != 0 {
                    return None;
                }
                let interface = u8::try_from(setup.index).ok()?;
                ctx.state.alternate(interface).map(|alt| vec![alt])
            }
            _ => None,
        }
    }
}

pub fn device_descriptor(speed: UsbSpeed, identity: &DeviceIdentity) -> [u8; 18] {
    let bcd_usb: u16 = match speed {
        UsbSpeed::Full => 0x0110,
        UsbSpeed::High => 0x0200,
        UsbSpeed::Super => 0x0320,
    };
    // SuperSpeed encodes bMaxPacketSize0 as an exponent (2^9 = 512).
    let max_packet0 = if speed.is_super_speed() { 9 } else { 64 };
    let [usb0, usb1] = bcd_usb.to_le_bytes();
    let [vid0, vid1] = identity.vendor_id.to_le_bytes();
    let [pid0, pid1] = identity.product_id.to_le_bytes();
    let [rel0, rel1] = identity.device_release.to_le_bytes();
    [
        18,
        DESC_DEVICE,
        usb0,
        usb1,
        0x00, // bDeviceClass (per interface)
        0x00,
        0x00,
        max_packet0,
        vid0,
        vid1,
        pid0,
        pid1,
        rel0,
        rel1,
        1, // iManufacturer
        2, // iProduct
        3, // iSerialNumber
        1, // bNumConfigurations
    ]
}

fn push_endpoint(out: &mut Vec<u8>, ep: &EndpointDescriptor) {
    let [mps0, mps1] = ep.max_packet_size.to_le_bytes();
    out.extend_from_slice(&[
        7,
        DESC_ENDPOINT,
        ep.address.raw(),
        ep.transfer.attributes(),
        mps0,
        mps1,
        ep.interval,
    ]);

    if let Some(companion) = ep.companion {
        let attributes = match ep.transfer {
            TransferType::Bulk => companion.max_streams_exp & 0x1f,
            _ => 0,
        };
        let [bpi0, bpi1] = companion.bytes_per_interval.to_le_bytes();
        out.extend_from_slice(&[
            6,
            DESC_SS_ENDPOINT_COMPANION,
            companion.max_burst,
            attributes,
            bpi0,
            bpi1,
        ]);
    }
}

pub fn configuration_descriptor(profile: &DeviceProfile) -> Vec<u8> {
    let mut out = vec![
        9,
        DESC_CONFIGURATION,
        0,
        0, // wTotalLength, patched below
        profile.interface_count(),
        CONFIGURATION_VALUE,
        0,
        CONFIG_ATTRIBUTES,
        CONFIG_MAX_POWER,
    ];

    for iface in &profile.interfaces {
        for alt in &iface.alternates {
            out.extend_from_slice(&[
                9,
                DESC_INTERFACE,
                iface.number,
                alt.value,
                alt.endpoints.len() as u8,
                iface.class,
                0x00,
                0x00,
                0,
            ]);
            for ep in &alt.endpoints {
                push_endpoint(&mut out, ep);
            }
        }
    }

    let total = (out.len() as u16).to_le_bytes();
    out[2..4].copy_from_slice(&total);
    out
}

pub fn bos_descriptor() -> Vec<u8> {
    let mut out = vec![5, DESC_BOS, 0, 0, 2];
    // USB 2.0 extension: LPM supported.
    out.extend_from_slice(&[7, DESC_DEVICE_CAPABILITY, CAP_USB20_EXTENSION, 0x02, 0, 0, 0]);
    // SuperSpeed capability: full/high/super supported, full speed functional,
    // U1 exit latency 10us, U2 exit latency 32us.
    out.extend_from_slice(&[
        10,
        DESC_DEVICE_CAPABILITY,
        CAP_SUPERSPEED_USB,
        0x00,
        0x0e,
        0x00,
        0x01,
        0x0a,
        0x20,
        0x00,
    ]);
    let total = (out.len() as u16).to_le_bytes();
    out[2..4].copy_from_slice(&total);
    out
}

fn string_descriptor(identity: &DeviceIdentity, index: u8) -> Option<Vec<u8>> {
    match index {
        0 => {
            let [l0, l1] = LANGID_EN_US.to_le_bytes();
            Some(vec![4, DESC_STRING, l0, l1])
        }
        1 => Some(string_descriptor_utf16le(&identity.manufacturer)),
        2 => Some(string_descriptor_utf16le(&identity.product)),
        3 => Some(string_descriptor_utf16le(&identity.serial)),
        _ => None,
    }
}

pub fn string_descriptor_utf16le(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + s.len() * 2);
    out.push(0); // bLength placeholder
    out.push(DESC_STRING);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out[0] = out.len() as u8;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileKind;

    #[test]
    fn string_descriptor_layout() {
        assert_eq!(string_descriptor_utf16le("Ab"), vec![6, DESC_STRING, b'A', 0, b'b', 0]);
        assert_eq!(string_descriptor_utf16le(""), vec![2, DESC_STRING]);
    }

    #[test]
    fn configuration_total_length_matches() {
        let profile = DeviceProfile::select(ProfileKind::PerClass, UsbSpeed::Full).unwrap();
        let desc = configuration_descriptor(&profile);
        // 9 config + 6 interfaces * 9 + 4 endpoints * 7.
        assert_eq!(desc.len(), 9 + 6 * 9 + 4 * 7);
        assert_eq!(u16::from_le_bytes([desc[2], desc[3]]) as usize, desc.len());
        assert_eq!(desc[4], 3);
        assert_eq!(desc[7], CONFIG_ATTRIBUTES);
    }

    #[test]
    fn bos_total_length_matches() {
        let bos = bos_descriptor();
        assert_eq!(bos.len(), 22);
        assert_eq!(u16::from_le_bytes([bos[2], bos[3]]), 22);
    }
}
