//! `trafficd status` — one-shot snapshot and today's cumulative totals,
//! read from the running daemon's query server.

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

use crate::config::TrafficConfig;

pub fn run(config: &TrafficConfig) -> Result<()> {
    println!("=== Current interval (snapshot) ===");
    print_traffic_table(config, "snapshot")?;

    println!();
    println!("=== Today ===");
    print_traffic_table(config, "traffic-daily")?;

    Ok(())
}

fn print_traffic_table(config: &TrafficConfig, command: &str) -> Result<()> {
    let addr = format!("127.0.0.1:{}", config.server_port);
    let mut stream = TcpStream::connect(&addr)
        .with_context(|| format!("connecting to trafficd query server at {addr}"))?;
    writeln!(stream, "{command}")?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let value: Value = serde_json::from_str(&line)?;

    if value["result"] != "success" {
        println!("  error: {}", value["errmsg"].as_str().unwrap_or("unknown"));
        return Ok(());
    }

    let data = value["data"].as_object().cloned().unwrap_or_default();
    if data.is_empty() {
        println!("  (no traffic recorded)");
        return Ok(());
    }

    println!(
        "  {:<24} {:>12} {:>12} {:>10} {:>10}",
        "APPLICATION", "RX BYTES", "TX BYTES", "RX PKTS", "TX PKTS"
    );
    println!("  {}", "-".repeat(72));
    let mut names: Vec<&String> = data.keys().collect();
    names.sort();
    for name in names {
        let cell = &data[name];
        println!(
            "  {:<24} {:>12} {:>12} {:>10} {:>10}",
            name,
            cell["bytes_rx"].as_u64().unwrap_or(0),
            cell["bytes_tx"].as_u64().unwrap_or(0),
            cell["pkt_rx"].as_u64().unwrap_or(0),
            cell["pkt_tx"].as_u64().unwrap_or(0),
        );
    }

    Ok(())
}
