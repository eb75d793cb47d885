use aero_dusb::state::ExitLatency;
use aero_dusb::timer::NS_PER_MS;
use aero_dusb::usb::{
    FEATURE_DEVICE_REMOTE_WAKEUP, FEATURE_ENDPOINT_HALT, REQ_CLEAR_FEATURE, REQ_GET_STATUS,
    REQ_SET_ADDRESS, REQ_SET_CONFIGURATION, REQ_SET_FEATURE, REQ_SET_INTERFACE, REQ_SET_SEL,
};
use aero_dusb::{
    AttachError, ControlResponse, DataTransfer, Direction, DusbConfig, DusbDevice,
    EndpointAddress, SetupPacket, UsbDeviceModel, UsbHandshake, UsbSpeed, WakeupSignal,
};

fn setup(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> SetupPacket {
    SetupPacket {
        request_type,
        request,
        value,
        index,
        length,
    }
}

fn attached(config: DusbConfig, speed: UsbSpeed) -> DusbDevice {
    let mut dev = DusbDevice::new(config).unwrap();
    dev.attach(speed, 0).unwrap();
    dev
}

fn control(dev: &mut DusbDevice, setup: SetupPacket) -> ControlResponse {
    dev.handle_control_request(setup, None)
}

fn endpoint_status(dev: &mut DusbDevice, ep: u8) -> ControlResponse {
    control(dev, setup(0x82, REQ_GET_STATUS, 0, u16::from(ep), 2))
}

fn endpoint_feature(dev: &mut DusbDevice, request: u8, ep: u8) -> ControlResponse {
    control(
        dev,
        setup(0x02, request, FEATURE_ENDPOINT_HALT, u16::from(ep), 0),
    )
}

#[test]
fn requests_before_attach_stall() {
    let mut dev = DusbDevice::new(DusbConfig::default()).unwrap();
    assert_eq!(
        control(&mut dev, setup(0x80, REQ_GET_STATUS, 0, 0, 2)),
        ControlResponse::Stall
    );
    let mut buf = [0u8; 8];
    assert_eq!(dev.handle_data(1, DataTransfer::In(&mut buf)), UsbHandshake::Stall);
}

#[test]
fn device_status_tracks_remote_wakeup() {
    let mut dev = attached(DusbConfig::default(), UsbSpeed::Full);
    let get_status = setup(0x80, REQ_GET_STATUS, 0, 0, 2);
    assert_eq!(control(&mut dev, get_status), ControlResponse::Data(vec![0, 0]));

    let set = setup(0x00, REQ_SET_FEATURE, FEATURE_DEVICE_REMOTE_WAKEUP, 0, 0);
    assert_eq!(control(&mut dev, set), ControlResponse::Ack);
    assert_eq!(control(&mut dev, get_status), ControlResponse::Data(vec![0x02, 0]));

    let clear = setup(0x00, REQ_CLEAR_FEATURE, FEATURE_DEVICE_REMOTE_WAKEUP, 0, 0);
    assert_eq!(control(&mut dev, clear), ControlResponse::Ack);
    assert_eq!(control(&mut dev, get_status), ControlResponse::Data(vec![0, 0]));

    // TEST_MODE and other device features are not supported.
    assert_eq!(
        control(&mut dev, setup(0x00, REQ_SET_FEATURE, 2, 0, 0)),
        ControlResponse::Stall
    );
}

#[test]
fn status_is_truncated_to_requested_length() {
    let mut dev = attached(DusbConfig::default(), UsbSpeed::Full);
    assert_eq!(
        control(&mut dev, setup(0x80, REQ_GET_STATUS, 0, 0, 1)),
        ControlResponse::Data(vec![0])
    );
}

#[test]
fn halt_blocks_transfers_until_cleared() {
    let mut dev = attached(DusbConfig::default(), UsbSpeed::Full);
    assert_eq!(
        control(&mut dev, setup(0x01, REQ_SET_INTERFACE, 1, 0, 0)),
        ControlResponse::Ack
    );

    let mut buf = [0u8; 64];
    assert_eq!(dev.handle_data(1, DataTransfer::In(&mut buf)), UsbHandshake::Nak);

    assert_eq!(endpoint_feature(&mut dev, REQ_SET_FEATURE, 0x81), ControlResponse::Ack);
    assert_eq!(endpoint_status(&mut dev, 0x81), ControlResponse::Data(vec![1, 0]));
    assert_eq!(dev.handle_data(1, DataTransfer::In(&mut buf)), UsbHandshake::Stall);

    assert_eq!(endpoint_feature(&mut dev, REQ_CLEAR_FEATURE, 0x81), ControlResponse::Ack);
    assert_eq!(endpoint_status(&mut dev, 0x81), ControlResponse::Data(vec![0, 0]));
    assert_eq!(dev.handle_data(1, DataTransfer::In(&mut buf)), UsbHandshake::Nak);
}

#[test]
fn halt_is_independent_of_alternate_membership() {
    let mut dev = attached(DusbConfig::default(), UsbSpeed::Full);

    // The isochronous endpoint only exists under interface 2 alternate 1.
    assert_eq!(endpoint_feature(&mut dev, REQ_SET_FEATURE, 0x85), ControlResponse::Ack);
    assert_eq!(endpoint_status(&mut dev, 0x85), ControlResponse::Data(vec![1, 0]));
    assert_eq!(endpoint_feature(&mut dev, REQ_CLEAR_FEATURE, 0x85), ControlResponse::Ack);

    let mut buf = [0u8; 16];
    assert_eq!(dev.handle_data(5, DataTransfer::In(&mut buf)), UsbHandshake::Stall);
}

#[test]
fn unknown_endpoints_and_endpoint_zero() {
    let mut dev = attached(DusbConfig::default(), UsbSpeed::Full);
    assert_eq!(endpoint_status(&mut dev, 0x00), ControlResponse::Data(vec![0, 0]));
    assert_eq!(endpoint_status(&mut dev, 0x80), ControlResponse::Data(vec![0, 0]));
    assert_eq!(endpoint_status(&mut dev, 0x82), ControlResponse::Stall);
    assert_eq!(endpoint_status(&mut dev, 0x01), ControlResponse::Stall);

    assert_eq!(endpoint_feature(&mut dev, REQ_SET_FEATURE, 0x00), ControlResponse::Stall);
    assert_eq!(endpoint_feature(&mut dev, REQ_CLEAR_FEATURE, 0x80), ControlResponse::Stall);
    assert_eq!(endpoint_feature(&mut dev, REQ_SET_FEATURE, 0x02), ControlResponse::Stall);
}

#[test]
fn address_and_configuration_are_recorded() {
    let mut dev = attached(DusbConfig::default(), UsbSpeed::High);
    assert_eq!(
        control(&mut dev, setup(0x00, REQ_SET_ADDRESS, 12, 0, 0)),
        ControlResponse::Ack
    );
    assert_eq!(
        control(&mut dev, setup(0x00, REQ_SET_CONFIGURATION, 1, 0, 0)),
        ControlResponse::Ack
    );
    let state = dev.state().unwrap();
    assert_eq!(state.address, 12);
    assert_eq!(state.configuration, 1);

    assert_eq!(
        control(&mut dev, setup(0x00, REQ_SET_ADDRESS, 200, 0, 0)),
        ControlResponse::Stall
    );
    assert_eq!(dev.state().unwrap().address, 12);
}

#[test]
fn set_interface_rejects_out_of_range_pairs() {
    let mut dev = attached(DusbConfig::default(), UsbSpeed::Full);
    for (iface, alt) in [(3, 0), (0, 2), (7, 1)] {
        assert_eq!(
            control(&mut dev, setup(0x01, REQ_SET_INTERFACE, alt, iface, 0)),
            ControlResponse::Stall
        );
    }
    assert_eq!(dev.state().unwrap().alternates(), &[0, 0, 0]);
    assert!(!dev.generator_armed());
}

#[test]
fn unsupported_requests_stall() {
    let mut dev = attached(DusbConfig::default(), UsbSpeed::Full);
    // Vendor request.
    assert_eq!(control(&mut dev, setup(0xc0, 0x01, 0, 0, 4)), ControlResponse::Stall);
    // SET_DESCRIPTOR.
    assert_eq!(control(&mut dev, setup(0x00, 0x07, 0x0100, 0, 18)), ControlResponse::Stall);
    // Class request on an interface.
    assert_eq!(control(&mut dev, setup(0x21, 0x0a, 0, 0, 0)), ControlResponse::Stall);
}

#[test]
fn exit_latency_only_at_super_speed() {
    let payload = [0x0a, 0x14, 0x00, 0x01, 0x00, 0x02];
    let sel = setup(0x00, REQ_SET_SEL, 0, 0, 6);

    let mut dev = attached(DusbConfig::default(), UsbSpeed::Super);
    assert_eq!(dev.handle_control_request(sel, Some(&payload)), ControlResponse::Ack);
    assert_eq!(
        dev.state().unwrap().exit_latency,
        Some(ExitLatency {
            u1_sel: 0x0a,
            u1_pel: 0x14,
            u2_sel: 0x0100,
            u2_pel: 0x0200,
        })
    );

    // Short payload, wrong direction, missing data stage.
    assert_eq!(
        dev.handle_control_request(setup(0x00, REQ_SET_SEL, 0, 0, 5), Some(&payload[..5])),
        ControlResponse::Stall
    );
    assert_eq!(
        dev.handle_control_request(setup(0x80, REQ_SET_SEL, 0, 0, 6), None),
        ControlResponse::Stall
    );
    assert_eq!(dev.handle_control_request(sel, None), ControlResponse::Stall);

    let mut dev = attached(DusbConfig::default(), UsbSpeed::High);
    assert_eq!(dev.handle_control_request(sel, Some(&payload)), ControlResponse::Stall);
    assert_eq!(dev.state().unwrap().exit_latency, None);
}

#[test]
fn wakeup_signals_only_while_enabled() {
    let mut dev = attached(
        DusbConfig {
            wakeup_interval_ms: 10,
            ..DusbConfig::default()
        },
        UsbSpeed::Full,
    );
    let mut signals: Vec<WakeupSignal> = Vec::new();

    dev.advance_to(10 * NS_PER_MS, &mut signals);
    assert!(signals.is_empty());
    assert!(dev.wakeup_armed());

    let enable = setup(0x00, REQ_SET_FEATURE, FEATURE_DEVICE_REMOTE_WAKEUP, 0, 0);
    control(&mut dev, enable);
    dev.advance_to(25 * NS_PER_MS, &mut signals);
    assert_eq!(
        signals,
        vec![WakeupSignal {
            endpoint: EndpointAddress::new(1, Direction::In),
            at_ns: 20 * NS_PER_MS,
        }]
    );

    // Reset disables remote wakeup but the task keeps its schedule.
    dev.handle_reset();
    dev.advance_to(30 * NS_PER_MS, &mut signals);
    assert_eq!(signals.len(), 1);
    assert!(dev.wakeup_armed());

    control(&mut dev, enable);
    dev.advance_to(40 * NS_PER_MS, &mut signals);
    assert_eq!(signals.len(), 2);
    assert_eq!(signals[1].at_ns, 40 * NS_PER_MS);

    dev.detach();
    assert!(!dev.wakeup_armed());
    dev.advance_to(100 * NS_PER_MS, &mut signals);
    assert_eq!(signals.len(), 2);
}

#[test]
fn wakeup_targets_lowest_interrupt_in_endpoint() {
    let config = DusbConfig::from_json(r#"{"layout": {"kind": "triplet", "interfaces": 3}}"#)
        .unwrap();
    let dev = attached(config, UsbSpeed::Super);
    assert_eq!(
        dev.wakeup().unwrap().target(),
        Some(EndpointAddress::new(1, Direction::In))
    );
}

#[test]
fn reset_clears_halts_and_address() {
    let mut dev = attached(DusbConfig::default(), UsbSpeed::Full);
    control(&mut dev, setup(0x00, REQ_SET_ADDRESS, 3, 0, 0));
    endpoint_feature(&mut dev, REQ_SET_FEATURE, 0x03);
    assert_eq!(endpoint_status(&mut dev, 0x03), ControlResponse::Data(vec![1, 0]));

    dev.handle_reset();
    assert_eq!(endpoint_status(&mut dev, 0x03), ControlResponse::Data(vec![0, 0]));
    let state = dev.state().unwrap();
    assert_eq!(state.address, 0);
    assert!(state.attached);
    assert_eq!(state.speed(), UsbSpeed::Full);
}

#[test]
fn double_attach_is_rejected() {
    let mut dev = attached(DusbConfig::default(), UsbSpeed::Full);
    assert_eq!(
        dev.attach(UsbSpeed::High, 0),
        Err(AttachError::AlreadyAttached(UsbSpeed::Full))
    );
}
