//! USB wire-level vocabulary shared by every component of the device model.

use core::fmt;

use serde::{Deserialize, Serialize};

pub const REQ_GET_STATUS: u8 = 0x00;
pub const REQ_CLEAR_FEATURE: u8 = 0x01;
pub const REQ_SET_FEATURE: u8 = 0x03;
pub const REQ_SET_ADDRESS: u8 = 0x05;
pub const REQ_GET_DESCRIPTOR: u8 = 0x06;
pub const REQ_GET_CONFIGURATION: u8 = 0x08;
pub const REQ_SET_CONFIGURATION: u8 = 0x09;
pub const REQ_GET_INTERFACE: u8 = 0x0a;
pub const REQ_SET_INTERFACE: u8 = 0x0b;
/// SuperSpeed exit-latency configuration (SET_SEL).
pub const REQ_SET_SEL: u8 = 0x30;

pub const FEATURE_ENDPOINT_HALT: u16 = 0x0000;
pub const FEATURE_DEVICE_REMOTE_WAKEUP: u16 = 0x0001;

/// Payload length of the exit-latency request: U1SEL, U1PEL, U2SEL (le16), U2PEL (le16).
pub const SET_SEL_PAYLOAD_LEN: usize = 6;

/// Link speed negotiated between the device and the host port.
///
/// Ordered from slowest to fastest so negotiation is a plain `min`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsbSpeed {
    Full,
    High,
    Super,
}

impl UsbSpeed {
    pub fn is_super_speed(self) -> bool {
        matches!(self, UsbSpeed::Super)
    }

    pub fn negotiate(device_max: UsbSpeed, host_port: UsbSpeed) -> UsbSpeed {
        device_max.min(host_port)
    }
}

impl fmt::Display for UsbSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UsbSpeed::Full => "full-speed",
            UsbSpeed::High => "high-speed",
            UsbSpeed::Super => "superspeed",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// Host-to-device.
    Out,
    /// Device-to-host.
    In,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
    Reserved,
}

/// An 8-byte SETUP packet as seen by a device's default control pipe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupPacket {
    #[serde(rename = "bmRequestType")]
    pub request_type: u8,
    #[serde(rename = "bRequest")]
    pub request: u8,
    #[serde(rename = "wValue")]
    pub value: u16,
    #[serde(rename = "wIndex")]
    pub index: u16,
    #[serde(rename = "wLength")]
    pub length: u16,
}

impl SetupPacket {
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self {
            request_type: bytes[0],
            request: bytes[1],
            value: u16::from_le_bytes([bytes[2], bytes[3]]),
            index: u16::from_le_bytes([bytes[4], bytes[5]]),
            length: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    pub fn direction(self) -> Direction {
        if self.request_type & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn request_type(self) -> RequestType {
        match (self.request_type >> 5) & 0x03 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        }
    }
}

/// Outcome of a control request at the SETUP level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlResponse {
    Data(Vec<u8>),
    Ack,
    Stall,
}

/// Outcome of a single data-stage transaction on a non-control endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbHandshake {
    /// Transfer completed; `bytes` is the actual length moved.
    Ack { bytes: usize },
    /// Endpoint has nothing to deliver yet; the host retries later.
    Nak,
    /// Request or transfer is invalid in the current state.
    Stall,
}

/// A protocol stall together with the reason it was raised.
///
/// Stalls are terminal for the single request that triggered them and are never retried by the
/// device; the reason only exists so the decision can be traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("protocol stall: {0}")]
pub struct Stall(pub &'static str);
