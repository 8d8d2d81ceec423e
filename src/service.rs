//! `trafficd service` — systemd integration.
//!
//! Installs and manages a systemd unit that runs `trafficd run` in the
//! background. Packet capture requires root, so the unit runs as `User=root`.

use anyhow::Result;
use std::process::Command;

const UNIT_PATH: &str = "/etc/systemd/system/trafficd.service";

pub fn install(config_path: &std::path::Path) -> Result<()> {
    let already_active = Command::new("systemctl")
        .args(["is-active", "--quiet", "trafficd"])
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    if already_active {
        println!("Service is already running.");
        println!();
        println!("  trafficd service stop     — stop the service");
        println!("  trafficd service restart  — restart the service");
        println!("  trafficd monitor          — open live dashboard");
        return Ok(());
    }

    let binary = std::env::current_exe()?;
    let config_abs = config_path
        .canonicalize()
        .unwrap_or_else(|_| config_path.to_path_buf());

    let unit = format!(
        r#"[Unit]
Description=trafficd — per-application network traffic accounting daemon
After=network.target

[Service]
Type=simple
User=root
ExecStart={binary} -c {config} run
Restart=always
RestartSec=5
StandardOutput=journal
StandardError=journal

[Install]
WantedBy=multi-user.target
"#,
        binary = binary.display(),
        config = config_abs.display(),
    );

    std::fs::write(UNIT_PATH, unit)?;

    let _ = Command::new("systemctl").arg("daemon-reload").status();
    let _ = Command::new("systemctl").args(["enable", "trafficd"]).status();
    let _ = Command::new("systemctl").args(["start", "trafficd"]).status();

    println!("Service installed, enabled, and started.");
    println!();
    println!("  trafficd monitor  — open live dashboard");
    println!("  trafficd status   — view latest traffic totals");

    Ok(())
}

pub fn uninstall() -> Result<()> {
    let _ = Command::new("systemctl").args(["stop", "trafficd"]).status();
    let _ = Command::new("systemctl")
        .args(["disable", "trafficd"])
        .status();
    std::fs::remove_file(UNIT_PATH)?;
    let _ = Command::new("systemctl").arg("daemon-reload").status();
    println!("Removed {}.", UNIT_PATH);
    Ok(())
}

pub fn control(action: &str) -> Result<()> {
    let ok = Command::new("systemctl")
        .args([action, "trafficd"])
        .status()?
        .success();
    anyhow::ensure!(ok, "systemctl {} trafficd failed", action);
    Ok(())
}
