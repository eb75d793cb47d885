//! Per-interface alternate-setting state machine.
//!
//! Each interface sits in one of `0..K` where `K` is its alternate count at the negotiated
//! speed. Only an accepted SET_INTERFACE moves it; reset puts every interface back to 0.
//! The side effects of a move (arming the generator, emptying buffers) are applied by the device
//! from the returned [`AltTransition`].

use crate::generator::GeneratorTarget;
use crate::profile::DeviceProfile;
use crate::state::DeviceState;
use crate::usb::Stall;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AltTransition {
    pub interface: u8,
    pub from: u8,
    pub to: u8,
    pub was_producing: bool,
    pub now_producing: bool,
}

impl AltTransition {
    pub fn left_producing(&self) -> bool {
        self.was_producing && !self.now_producing
    }
}

pub fn select_alternate(
    state: &mut DeviceState,
    profile: &DeviceProfile,
    interface: u16,
    value: u16,
) -> Result<AltTransition, Stall> {
    let iface_num = u8::try_from(interface).map_err(|_| Stall("interface out of range"))?;
    let iface = profile
        .interface(iface_num)
        .ok_or(Stall("interface out of range"))?;
    let to = u8::try_from(value).map_err(|_| Stall("alternate setting out of range"))?;
    if to >= iface.alternate_count() {
        return Err(Stall("alternate setting out of range"));
    }
    let from = state
        .alternate(iface_num)
        .ok_or(Stall("interface out of range"))?;

    state.set_alternate(iface_num, to);

    Ok(AltTransition {
        interface: iface_num,
        from,
        to,
        was_producing: iface.is_producing(from),
        now_producing: iface.is_producing(to),
    })
}

/// Whether any interface currently sits in its producing alternate.
pub fn any_producing(state: &DeviceState, profile: &DeviceProfile) -> bool {
    profile.interfaces.iter().any(|iface| {
        state
            .alternate(iface.number)
            .is_some_and(|alt| iface.is_producing(alt))
    })
}

/// Device-to-host endpoints of every producing alternate, in interface order and then in
/// descriptor order within the alternate.
pub fn producing_targets(state: &DeviceState, profile: &DeviceProfile) -> Vec<GeneratorTarget> {
    profile
        .interfaces
        .iter()
        .filter_map(|iface| {
            let alt = iface.alternate(state.alternate(iface.number)?)?;
            alt.is_producing().then_some(alt)
        })
        .flat_map(|alt| alt.endpoints.iter())
        .map(|ep| GeneratorTarget {
            address: ep.address,
            len: ep.max_packet_size as usize,
        })
        .collect()
}
