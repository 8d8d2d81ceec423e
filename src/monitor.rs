//! `trafficd monitor` — live dashboard over the query server's `live`
//! stream. Ctrl-C closes the view; the daemon keeps running.

use anyhow::Result;
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::color;
use crate::config::TrafficConfig;

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn handle_sigint(_: libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

pub fn run(config: &TrafficConfig, _interval: u64) -> Result<()> {
    let addr = format!("127.0.0.1:{}", config.server_port);
    let mut stream = match TcpStream::connect(&addr) {
        Ok(s) => s,
        Err(e) => {
            println!(
                "{}",
                color::yellow(&format!("Could not reach trafficd at {addr} ({e})."))
            );
            println!("Check: trafficd service status");
            return Ok(());
        }
    };
    writeln!(stream, "live")?;
    let mut reader = BufReader::new(stream.try_clone()?);

    RUNNING.store(true, Ordering::SeqCst);
    unsafe { libc::signal(libc::SIGINT, handle_sigint as *const () as libc::sighandler_t) };

    println!("{}", color::bold_cyan("TRAFFICD MONITOR  —  Ctrl-C to close  (daemon keeps running)"));
    println!();

    let mut lines_drawn = 0usize;
    let mut line = String::new();
    while RUNNING.load(Ordering::SeqCst) {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            println!("{}", color::bold_green("Connection closed by daemon."));
            break;
        }

        let Ok(value) = serde_json::from_str::<Value>(&line) else { continue };
        if value["result"] != "success" {
            println!("{}", color::red(&format!("error: {}", value["errmsg"].as_str().unwrap_or("unknown"))));
            continue;
        }

        if lines_drawn > 0 {
            print!("\x1b[{lines_drawn}A\x1b[0J");
        }
        lines_drawn = draw_dashboard(&value);
    }

    Ok(())
}

fn draw_dashboard(value: &Value) -> usize {
    let mut lines = 0usize;
    let interval = value["interval"].as_u64().unwrap_or(0);
    let data = value["data"].as_object().cloned().unwrap_or_default();

    println!("{}", color::dim(&format!("interval: {interval}s   apps: {}", data.len())));
    lines += 1;
    println!(
        "  {}",
        color::bold(&format!(
            "{:<24} {:>12} {:>12} {:>10} {:>10}",
            "APPLICATION", "RX BYTES", "TX BYTES", "RX PKTS", "TX PKTS"
        ))
    );
    lines += 1;
    println!("  {}", "-".repeat(72));
    lines += 1;

    let mut rows: Vec<(&String, &Value)> = data.iter().collect();
    rows.sort_by(|a, b| {
        let ta = a.1["bytes_rx"].as_u64().unwrap_or(0) + a.1["bytes_tx"].as_u64().unwrap_or(0);
        let tb = b.1["bytes_rx"].as_u64().unwrap_or(0) + b.1["bytes_tx"].as_u64().unwrap_or(0);
        tb.cmp(&ta)
    });

    for (name, cell) in &rows {
        let bytes_rx = color::lpad(&cell["bytes_rx"].as_u64().unwrap_or(0).to_string(), 12);
        let bytes_tx = color::lpad(&cell["bytes_tx"].as_u64().unwrap_or(0).to_string(), 12);
        println!(
            "  {} {} {} {:>10} {:>10}",
            color::rpad(name, 24),
            color::green(&bytes_rx),
            color::cyan(&bytes_tx),
            cell["pkt_rx"].as_u64().unwrap_or(0),
            cell["pkt_tx"].as_u64().unwrap_or(0),
        );
        lines += 1;
    }
    if rows.is_empty() {
        println!("  (no traffic this interval)");
        lines += 1;
    }
    lines
}
