//! Control-request dispatcher for standard and SuperSpeed requests handled by the device core.
//!
//! Retrieval requests have already been offered to the descriptor source by the time a request
//! reaches [`dispatch`]. Anything not matched here stalls.

use crate::alt_setting::{select_alternate, AltTransition};
use crate::endpoint::{EndpointAddress, EndpointRegistry};
use crate::profile::DeviceProfile;
use crate::state::{DeviceState, ExitLatency};
use crate::usb::{
    RequestType, SetupPacket, Stall, FEATURE_DEVICE_REMOTE_WAKEUP, FEATURE_ENDPOINT_HALT,
    REQ_CLEAR_FEATURE, REQ_GET_STATUS, REQ_SET_ADDRESS, REQ_SET_CONFIGURATION, REQ_SET_FEATURE,
    REQ_SET_INTERFACE, REQ_SET_SEL, SET_SEL_PAYLOAD_LEN,
};

const MAX_USB_ADDRESS: u16 = 127;
const CONFIGURATION_VALUE: u16 = 1;

/// Result of a request accepted by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Data(Vec<u8>),
    Ack,
    /// SET_INTERFACE was accepted; the caller applies generator and buffer side effects.
    AlternateChanged(AltTransition),
}

pub fn dispatch(
    state: &mut DeviceState,
    profile: &DeviceProfile,
    registry: &EndpointRegistry,
    setup: SetupPacket,
    data: Option<&[u8]>,
) -> Result<Dispatched, Stall> {
    if setup.request_type() != RequestType::Standard {
        return Err(Stall("non-standard request"));
    }
    match (setup.request_type, setup.request) {
        (0x80, REQ_GET_STATUS) => {
            if setup.value != 0 || setup.index != 0 {
                return Err(Stall("malformed device GET_STATUS"));
            }
            Ok(Dispatched::Data(state.status().bits().to_le_bytes().to_vec()))
        }
        (0x82, REQ_GET_STATUS) => {
            if setup.value != 0 {
                return Err(Stall("malformed endpoint GET_STATUS"));
            }
            let ep = endpoint_from_index(setup.index)?;
            if ep.is_control() {
                return Ok(Dispatched::Data(vec![0, 0]));
            }
            if !registry.contains(ep) {
                return Err(Stall("no such endpoint"));
            }
            let halted = u8::from(state.is_halted(ep));
            Ok(Dispatched::Data(vec![halted, 0]))
        }
        (0x00, REQ_CLEAR_FEATURE) | (0x00, REQ_SET_FEATURE) => {
            no_data_stage(setup)?;
            if setup.value != FEATURE_DEVICE_REMOTE_WAKEUP || setup.index != 0 {
                return Err(Stall("unsupported device feature"));
            }
            state.remote_wakeup_enabled = setup.request == REQ_SET_FEATURE;
            Ok(Dispatched::Ack)
        }
        (0x02, REQ_CLEAR_FEATURE) | (0x02, REQ_SET_FEATURE) => {
            no_data_stage(setup)?;
            if setup.value != FEATURE_ENDPOINT_HALT {
                return Err(Stall("unsupported endpoint feature"));
            }
            let ep = endpoint_from_index(setup.index)?;
            if ep.is_control() || !registry.contains(ep) {
                return Err(Stall("no such endpoint"));
            }
            state.set_halted(ep, setup.request == REQ_SET_FEATURE);
            Ok(Dispatched::Ack)
        }
        (0x01, REQ_SET_INTERFACE) => {
            no_data_stage(setup)?;
            let transition = select_alternate(state, profile, setup.index, setup.value)?;
            Ok(Dispatched::AlternateChanged(transition))
        }
        (0x00, REQ_SET_ADDRESS) => {
            no_data_stage(setup)?;
            if setup.index != 0 || setup.value > MAX_USB_ADDRESS {
                return Err(Stall("invalid device address"));
            }
            state.address = setup.value as u8;
            Ok(Dispatched::Ack)
        }
        (0x00, REQ_SET_CONFIGURATION) => {
            no_data_stage(setup)?;
            if setup.index != 0 || setup.value > CONFIGURATION_VALUE {
                return Err(Stall("invalid configuration value"));
            }
            state.configuration = setup.value as u8;
            Ok(Dispatched::Ack)
        }
        (0x00, REQ_SET_SEL) => {
            if !state.speed().is_super_speed() {
                return Err(Stall("exit latency request requires SuperSpeed"));
            }
            if setup.value != 0
                || setup.index != 0
                || setup.length as usize != SET_SEL_PAYLOAD_LEN
            {
                return Err(Stall("malformed exit latency request"));
            }
            let payload: &[u8; SET_SEL_PAYLOAD_LEN] = data
                .and_then(|d| d.try_into().ok())
                .ok_or(Stall("exit latency payload must be 6 bytes"))?;
            state.exit_latency = Some(ExitLatency::from_payload(payload));
            Ok(Dispatched::Ack)
        }
        _ => Err(Stall("unsupported request")),
    }
}

fn no_data_stage(setup: SetupPacket) -> Result<(), Stall> {
    if setup.length != 0 {
        return Err(Stall("unexpected data stage"));
    }
    Ok(())
}

fn endpoint_from_index(index: u16) -> Result<EndpointAddress, Stall> {
    // Bits 6:4 are reserved in an endpoint wIndex.
    if index & !0x008f != 0 {
        return Err(Stall("malformed endpoint index"));
    }
    Ok(EndpointAddress::from_raw(index as u8))
}
