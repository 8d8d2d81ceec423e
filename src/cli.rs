//! CLI definitions for trafficd.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(
    name = "trafficd",
    version,
    about = "Per-application network traffic accounting daemon",
    long_about = None
)]
pub struct Cli {
    /// Path to trafficd.toml config file
    #[clap(long, short, default_value = "trafficd.toml")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print an example trafficd.toml to stdout
    Init,

    /// Run the capture daemon in the foreground
    Run,

    /// Show network interfaces and the addresses trafficd would bind to
    Discover,

    /// Live-updating per-application traffic dashboard (Ctrl-C to stop)
    Monitor {
        /// Dashboard refresh interval in seconds (server-driven; this caps how long to wait)
        #[clap(long, default_value = "30")]
        interval: u64,
    },

    /// One-shot snapshot of current and today's traffic
    Status,

    /// Query historical traffic totals
    History {
        /// Sum all traffic recorded since this unix timestamp
        #[clap(long, conflicts_with = "between")]
        since: Option<i64>,

        /// Sum all traffic recorded between two unix timestamps
        #[clap(long, num_args = 2, value_names = ["START", "END"])]
        between: Option<Vec<i64>>,
    },

    /// Manage trafficd as a systemd service
    Service {
        #[clap(subcommand)]
        action: ServiceAction,
    },
}

#[derive(Subcommand)]
pub enum ServiceAction {
    Install,
    Uninstall,
    Start,
    Stop,
    Restart,
    Status,
}
