use thiserror::Error;

use crate::usb::UsbSpeed;

/// A profile that cannot be realized on the bus.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("interface count {requested} outside 1..={max}")]
    InterfaceCount { requested: u8, max: u8 },

    #[error("endpoint number {number} outside 1..=15")]
    EndpointNumberOutOfRange { number: u8 },

    #[error("endpoint {address:#04x} exposed by interface {first} and interface {second}")]
    SharedEndpoint { address: u8, first: u8, second: u8 },
}

/// Invalid construction-time configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{which} interval must be non-zero")]
    ZeroInterval { which: &'static str },

    #[error("{which} interval of {ms} ms exceeds the {max} ms the device clock can represent")]
    IntervalTooLarge {
        which: &'static str,
        ms: u64,
        max: u64,
    },

    #[error("invalid layout: {0}")]
    Layout(#[from] ProfileError),

    #[error("string descriptor `{field}` too long ({units} UTF-16 units, max {max})")]
    StringTooLong {
        field: &'static str,
        units: usize,
        max: usize,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Fatal attach failures; the device stays detached.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttachError {
    #[error("device is already attached at {0}")]
    AlreadyAttached(UsbSpeed),

    #[error("profile cannot be realized at {speed}: {source}")]
    Profile {
        speed: UsbSpeed,
        #[source]
        source: ProfileError,
    },
}
