//! `trafficd discover` — enumerate network interfaces and the addresses
//! `AddressSet` would bind to for each. Read-only, no daemon state.

use anyhow::Result;
use pcap::Device;

pub fn run(config: &crate::config::TrafficConfig) -> Result<()> {
    let devices = Device::list()?;
    if devices.is_empty() {
        println!("No capture-capable interfaces found (are you running as root?).");
        return Ok(());
    }

    let default_name = Device::lookup()?.map(|d| d.name);

    println!("  {:<16} {:<8} {:<24} ", "INTERFACE", "UP", "ADDRESSES");
    println!("  {}", "-".repeat(64));
    for dev in &devices {
        let marker = if Some(&dev.name) == default_name.as_ref() { " (default)" } else { "" };
        let configured = if dev.name == config.interface { " (configured)" } else { "" };
        let up = if dev.flags.is_up() { "yes" } else { "no" };
        let addrs: Vec<String> = dev
            .addresses
            .iter()
            .map(|a| a.addr.to_string())
            .collect();
        println!(
            "  {:<16} {:<8} {:<24}{}{}",
            dev.name,
            up,
            addrs.join(", "),
            marker,
            configured,
        );
    }

    if config.interface.is_empty() {
        println!();
        println!("No interface configured — `trafficd run` will use the first enumerated device.");
    }

    Ok(())
}
