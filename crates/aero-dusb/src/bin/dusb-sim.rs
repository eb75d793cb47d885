#![forbid(unsafe_code)]

//! Drives a DUSB device through enumeration and a polling run on simulated time.

use std::collections::BTreeMap;
use std::path::PathBuf;

use aero_dusb::descriptors::{DESC_CONFIGURATION, DESC_DEVICE};
use aero_dusb::timer::NS_PER_MS;
use aero_dusb::usb::{
    REQ_GET_DESCRIPTOR, REQ_SET_ADDRESS, REQ_SET_CONFIGURATION, REQ_SET_FEATURE, REQ_SET_INTERFACE,
    FEATURE_DEVICE_REMOTE_WAKEUP,
};
use aero_dusb::{
    ControlResponse, DataTransfer, DusbConfig, DusbDevice, EndpointAddress, SetupPacket,
    UsbDeviceModel, UsbHandshake, UsbSpeed, WakeupSignal,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const POLL_BUFFER_LEN: usize = 1024;
const DEVICE_ADDRESS: u16 = 1;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SpeedArg {
    Full,
    High,
    Super,
}

impl From<SpeedArg> for UsbSpeed {
    fn from(value: SpeedArg) -> Self {
        match value {
            SpeedArg::Full => UsbSpeed::Full,
            SpeedArg::High => UsbSpeed::High,
            SpeedArg::Super => UsbSpeed::Super,
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "Enumerate a simulated DUSB device and poll its IN endpoints")]
struct Args {
    /// JSON device configuration. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Speed of the host port the device is attached to.
    #[arg(long, value_enum, default_value_t = SpeedArg::Super)]
    host_speed: SpeedArg,

    /// Override the data generator interval.
    #[arg(long)]
    data_interval_ms: Option<u64>,

    /// Override the remote-wakeup interval.
    #[arg(long)]
    wakeup_interval_ms: Option<u64>,

    /// Simulated run length.
    #[arg(long, default_value_t = 120_000)]
    run_ms: u64,

    /// Host polling period for IN endpoints.
    #[arg(long, default_value_t = 1_000)]
    poll_ms: u64,

    /// Enable remote wakeup during enumeration.
    #[arg(long)]
    remote_wakeup: bool,
}

#[derive(Debug, Default)]
struct EndpointStats {
    acks: u64,
    bytes: u64,
    naks: u64,
    stalls: u64,
}

fn load_config(args: &Args) -> Result<DusbConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            DusbConfig::from_json(&text).with_context(|| format!("parse config {}", path.display()))?
        }
        None => DusbConfig::default(),
    };
    if let Some(ms) = args.data_interval_ms {
        config.data_interval_ms = ms;
    }
    if let Some(ms) = args.wakeup_interval_ms {
        config.wakeup_interval_ms = ms;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn control(
    dev: &mut DusbDevice,
    request_type: u8,
    request: u8,
    value: u16,
    index: u16,
    length: u16,
) -> Result<ControlResponse> {
    let setup = SetupPacket {
        request_type,
        request,
        value,
        index,
        length,
    };
    match dev.handle_control_request(setup, None) {
        ControlResponse::Stall => {
            bail!("request {request:#04x} (value {value:#06x}, index {index}) stalled")
        }
        resp => Ok(resp),
    }
}

fn enumerate(dev: &mut DusbDevice, remote_wakeup: bool) -> Result<()> {
    match control(dev, 0x80, REQ_GET_DESCRIPTOR, u16::from(DESC_DEVICE) << 8, 0, 18)? {
        ControlResponse::Data(desc) if desc.len() >= 12 => info!(
            vid = %format!("{:04x}", u16::from_le_bytes([desc[8], desc[9]])),
            pid = %format!("{:04x}", u16::from_le_bytes([desc[10], desc[11]])),
            "device descriptor"
        ),
        other => bail!("unexpected device descriptor response: {other:?}"),
    }

    let config_value = u16::from(DESC_CONFIGURATION) << 8;
    let total = match control(dev, 0x80, REQ_GET_DESCRIPTOR, config_value, 0, 9)? {
        ControlResponse::Data(head) if head.len() >= 4 => u16::from_le_bytes([head[2], head[3]]),
        other => bail!("unexpected configuration header response: {other:?}"),
    };
    if let ControlResponse::Data(full) =
        control(dev, 0x80, REQ_GET_DESCRIPTOR, config_value, 0, total)?
    {
        debug!(len = full.len(), "configuration descriptor");
    }

    control(dev, 0x00, REQ_SET_ADDRESS, DEVICE_ADDRESS, 0, 0)?;
    control(dev, 0x00, REQ_SET_CONFIGURATION, 1, 0, 0)?;
    if remote_wakeup {
        control(dev, 0x00, REQ_SET_FEATURE, FEATURE_DEVICE_REMOTE_WAKEUP, 0, 0)?;
    }

    let producing: Vec<(u8, u8)> = dev
        .profile()
        .map(|profile| {
            profile
                .interfaces
                .iter()
                .filter_map(|iface| Some((iface.number, iface.producing_alternate()?)))
                .collect()
        })
        .unwrap_or_default();
    for (interface, alt) in producing {
        control(dev, 0x01, REQ_SET_INTERFACE, u16::from(alt), u16::from(interface), 0)?;
        info!(interface, alt, "selected producing alternate");
    }
    Ok(())
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    if args.poll_ms == 0 {
        bail!("--poll-ms must be non-zero");
    }
    let config = load_config(&args)?;

    let mut dev = DusbDevice::new(config)?;
    let speed = dev.attach(args.host_speed.into(), 0)?;
    info!(%speed, "attached");

    enumerate(&mut dev, args.remote_wakeup)?;

    let in_endpoints: Vec<EndpointAddress> = dev
        .registry()
        .map(|r| r.addresses().filter(|ep| ep.is_in()).collect())
        .unwrap_or_default();

    let mut stats: BTreeMap<EndpointAddress, EndpointStats> = BTreeMap::new();
    let mut wakeups: Vec<WakeupSignal> = Vec::new();
    let mut buf = vec![0u8; POLL_BUFFER_LEN];

    let mut now_ms = 0;
    while now_ms <= args.run_ms {
        dev.advance_to(now_ms.saturating_mul(NS_PER_MS), &mut wakeups);
        for &ep in &in_endpoints {
            let entry = stats.entry(ep).or_default();
            match dev.handle_data(ep.number(), DataTransfer::In(&mut buf)) {
                UsbHandshake::Ack { bytes } => {
                    entry.acks += 1;
                    entry.bytes += bytes as u64;
                    debug!(%ep, bytes, first = buf[0], now_ms, "IN data");
                }
                UsbHandshake::Nak => entry.naks += 1,
                UsbHandshake::Stall => entry.stalls += 1,
            }
        }
        now_ms += args.poll_ms;
    }

    println!("speed: {speed}");
    for (ep, s) in &stats {
        println!(
            "{ep}: {} packets, {} bytes, {} NAK, {} STALL",
            s.acks, s.bytes, s.naks, s.stalls
        );
    }
    println!("remote wakeups: {}", wakeups.len());
    Ok(())
}
