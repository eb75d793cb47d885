//! DUSB: a simulated multi-speed USB test peripheral.
//!
//! The device exposes several vendor-class interfaces whose alternate settings switch between a
//! receiving shape (no endpoints or host-to-device endpoints) and a producing shape
//! (device-to-host endpoints only). While any interface sits in its producing alternate, a
//! periodic generator fills the IN endpoints with deterministic payloads; a second periodic task
//! raises remote-wakeup signals while the host has enabled them.
//!
//! The host controller drives everything through [`UsbDeviceModel`] plus
//! [`DusbDevice::advance_to`], which fires due timers against an externally supplied `now_ns`
//! clock.
#![forbid(unsafe_code)]

pub mod alt_setting;
pub mod buffers;
pub mod config;
pub mod control;
pub mod descriptors;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod generator;
pub mod profile;
pub mod state;
pub mod timer;
pub mod transfer;
pub mod usb;
pub mod wakeup;

pub use config::{DeviceIdentity, DusbConfig};
pub use descriptors::{DescriptorContext, DescriptorSource, StandardDescriptors};
pub use device::{DusbDevice, UsbDeviceModel};
pub use endpoint::{EndpointAddress, TransferType};
pub use error::{AttachError, ConfigError, ProfileError};
pub use profile::ProfileKind;
pub use transfer::DataTransfer;
pub use usb::{ControlResponse, Direction, SetupPacket, UsbHandshake, UsbSpeed};
pub use wakeup::{IgnoreWakeup, WakeupSignal, WakeupSink};
