//! Transfer admission and endpoint buffer engine.

use tracing::{debug, trace};

use crate::buffers::EndpointBuffers;
use crate::endpoint::{EndpointAddress, EndpointRegistry};
use crate::state::DeviceState;
use crate::usb::{Direction, Stall, UsbHandshake};

/// One data-stage transaction on a non-control endpoint.
#[derive(Debug)]
pub enum DataTransfer<'a> {
    /// Device-to-host; the slice length is the requested size.
    In(&'a mut [u8]),
    /// Host-to-device payload.
    Out(&'a [u8]),
}

impl DataTransfer<'_> {
    pub fn direction(&self) -> Direction {
        match self {
            DataTransfer::In(_) => Direction::In,
            DataTransfer::Out(_) => Direction::Out,
        }
    }

    pub fn requested_len(&self) -> usize {
        match self {
            DataTransfer::In(buf) => buf.len(),
            DataTransfer::Out(data) => data.len(),
        }
    }
}

/// Decides whether `address` may transfer right now.
///
/// Order matters: a halted endpoint stalls for the halt even if it is also unreachable.
/// Reachability is membership in the active alternate of the owning interface, not the raw
/// endpoint number.
pub fn admit(
    state: &DeviceState,
    registry: &EndpointRegistry,
    address: EndpointAddress,
) -> Result<(), Stall> {
    if address.is_control() {
        return Err(Stall("control endpoint carries no data transfers"));
    }
    if state.is_halted(address) {
        return Err(Stall("endpoint halted"));
    }
    let interface = registry
        .owning_interface(address)
        .ok_or(Stall("endpoint not in profile"))?;
    let active = state
        .alternate(interface)
        .ok_or(Stall("endpoint not in profile"))?;
    if !registry.is_member(address, interface, active) {
        return Err(Stall("endpoint not in active alternate setting"));
    }
    Ok(())
}

pub fn handle_transfer(
    state: &DeviceState,
    registry: &EndpointRegistry,
    buffers: &mut EndpointBuffers,
    endpoint: u8,
    transfer: DataTransfer<'_>,
) -> UsbHandshake {
    let address = EndpointAddress::new(endpoint, transfer.direction());
    if let Err(stall) = admit(state, registry, address) {
        debug!(ep = %address, reason = stall.0, "transfer stalled");
        return UsbHandshake::Stall;
    }

    match transfer {
        DataTransfer::Out(data) => {
            trace!(ep = %address, len = data.len(), payload = ?data, "OUT payload consumed");
            UsbHandshake::Ack { bytes: data.len() }
        }
        DataTransfer::In(buf) => match buffers.drain_into(address, buf) {
            Some(bytes) => {
                trace!(ep = %address, bytes, "IN payload delivered");
                UsbHandshake::Ack { bytes }
            }
            None => UsbHandshake::Nak,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alt_setting::select_alternate;
    use crate::profile::{DeviceProfile, ProfileKind};
    use crate::usb::UsbSpeed;

    #[test]
    fn halt_is_checked_before_membership() {
        let profile = DeviceProfile::select(ProfileKind::PerClass, UsbSpeed::Full).unwrap();
        let registry = EndpointRegistry::build(&profile).unwrap();
        let mut state = DeviceState::new(UsbSpeed::Full, 3);
        let int_in = EndpointAddress::new(1, Direction::In);

        assert_eq!(
            admit(&state, &registry, int_in),
            Err(Stall("endpoint not in active alternate setting"))
        );
        state.set_halted(int_in, true);
        assert_eq!(admit(&state, &registry, int_in), Err(Stall("endpoint halted")));

        state.set_halted(int_in, false);
        select_alternate(&mut state, &profile, 0, 1).unwrap();
        assert_eq!(admit(&state, &registry, int_in), Ok(()));
    }

    #[test]
    fn out_consumes_full_payload() {
        let profile = DeviceProfile::select(ProfileKind::PerClass, UsbSpeed::Full).unwrap();
        let registry = EndpointRegistry::build(&profile).unwrap();
        let state = DeviceState::new(UsbSpeed::Full, 3);
        let mut buffers = EndpointBuffers::new();

        let data = [0xaa; 40];
        assert_eq!(
            handle_transfer(&state, &registry, &mut buffers, 3, DataTransfer::Out(&data)),
            UsbHandshake::Ack { bytes: 40 }
        );
        assert_eq!(
            handle_transfer(&state, &registry, &mut buffers, 0, DataTransfer::Out(&data)),
            UsbHandshake::Stall
        );
        assert_eq!(
            handle_transfer(&state, &registry, &mut buffers, 9, DataTransfer::Out(&data)),
            UsbHandshake::Stall
        );
    }
}
