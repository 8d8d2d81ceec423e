//! trafficd — per-application network traffic accounting daemon.
//!
//! Observes IP packets on a capture interface, attributes each to its
//! owning process via the kernel's socket and process tables, accumulates
//! per-application counters, and persists them to a local store. Run
//! `trafficd --help` for usage.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod capture;
mod cli;
mod color;
mod config;
mod discover;
mod history;
mod monitor;
mod run;
mod server;
mod service;
mod status;

use cli::{Cli, Commands, ServiceAction};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Init => None,
        _ => {
            if !cli.config.exists() {
                let example = config::TrafficConfig::default_example();
                std::fs::write(&cli.config, toml::to_string_pretty(&example)?)?;
                eprintln!(
                    "Created '{}' — run `trafficd discover` to pick an interface.",
                    cli.config.display()
                );
            }
            Some(config::TrafficConfig::load(&cli.config)?)
        }
    };

    match cli.command {
        Commands::Init => {
            let example = config::TrafficConfig::default_example();
            print!("{}", toml::to_string_pretty(&example)?);
        }
        Commands::Run => {
            if let Err(e) = run::run(config.as_ref().unwrap()) {
                eprintln!("trafficd: fatal: {e:#}");
                std::process::exit(1);
            }
        }
        Commands::Discover => {
            discover::run(config.as_ref().unwrap())?;
        }
        Commands::Monitor { interval } => {
            monitor::run(config.as_ref().unwrap(), interval)?;
        }
        Commands::Status => {
            status::run(config.as_ref().unwrap())?;
        }
        Commands::History { since, between } => {
            history::run(config.as_ref().unwrap(), since, between)?;
        }
        Commands::Service { action } => {
            let cfg_path = &cli.config;
            match action {
                ServiceAction::Install => service::install(cfg_path)?,
                ServiceAction::Uninstall => service::uninstall()?,
                ServiceAction::Start => service::control("start")?,
                ServiceAction::Stop => service::control("stop")?,
                ServiceAction::Restart => service::control("restart")?,
                ServiceAction::Status => service::control("status")?,
            }
        }
    }

    Ok(())
}
