//! `CaptureLoop` — drives the capture source, feeds `PacketDecoder`, then
//! `Resolver`, then `Accumulator`. Per §4.8/§6: device opened once with
//! promiscuous/immediate flags and a 100ms timeout; activation failure is
//! fatal.

use anyhow::{anyhow, Context, Result};
use pcap::{Active, Capture, Device};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use traffic_core::{AddressSet, Accumulator, Packet, Resolver};

use crate::config::TrafficConfig;

const CAPTURE_TIMEOUT_MS: i32 = 100;

/// Open and activate the capture device named in `config`, or the first
/// enumerated device if none is configured. Activation failure is fatal
/// per spec.
pub fn open_capture(config: &TrafficConfig) -> Result<(Capture<Active>, String)> {
    let device = if config.interface.is_empty() {
        Device::lookup()
            .context("enumerating capture devices")?
            .ok_or_else(|| anyhow!("no capture-capable network interface found"))?
    } else {
        Device::list()
            .context("enumerating capture devices")?
            .into_iter()
            .find(|d| d.name == config.interface)
            .ok_or_else(|| anyhow!("configured interface '{}' not found", config.interface))?
    };
    let name = device.name.clone();

    let capture = Capture::from_device(device)
        .with_context(|| format!("opening capture device {name}"))?
        .promisc(config.promiscuous)
        .immediate_mode(config.immediate)
        .timeout(CAPTURE_TIMEOUT_MS)
        .open()
        .with_context(|| format!("activating capture device {name}"))?;

    Ok((capture, name))
}

/// Build the `AddressSet` for the given interface, failing startup if the
/// interface has no usable IPv4 address.
pub fn address_set_for(interface: &str) -> Result<AddressSet> {
    AddressSet::for_interface(interface)
        .with_context(|| format!("resolving local addresses on {interface}"))
}

/// Drive the capture loop until `running` is cleared. Each frame: decode,
/// drop if discarded, else resolve and accumulate. No I/O besides the
/// capture read itself.
pub fn run(
    mut capture: Capture<Active>,
    addrs: Arc<AddressSet>,
    resolver: Arc<Resolver>,
    accumulator: Arc<Accumulator>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        let raw = match capture.next_packet() {
            Ok(p) => p,
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(e) => {
                tracing::warn!("capture read error: {e}");
                continue;
            }
        };

        let ts = raw.header.ts.tv_sec as i64;
        let wire_len = raw.header.len;
        let pkt: Packet = Packet::decode(ts, wire_len, raw.data, &addrs);
        if pkt.discard {
            continue;
        }

        let process = resolver.resolve(&pkt);
        accumulator.add(&process.name, &pkt);
    }
}

/// Spawn the capture loop on its own thread.
pub fn spawn_capture_thread(
    capture: Capture<Active>,
    addrs: Arc<AddressSet>,
    resolver: Arc<Resolver>,
    accumulator: Arc<Accumulator>,
    running: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("capture-loop".into())
        .spawn(move || run(capture, addrs, resolver, accumulator, running))
        .expect("failed to spawn capture thread")
}
