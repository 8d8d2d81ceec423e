//! `trafficd run` — foreground capture daemon.
//!
//! Opens the capture device, then starts the capture thread, the deposit
//! loop, the two 60s negative-cache housekeepers, and the query server;
//! blocks until SIGINT/SIGTERM per §5 "Cancellation & lifecycle".

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use traffic_core::accumulator::spawn_deposit_loop;
use traffic_core::process_table::spawn_negative_cache_housekeeper as spawn_process_housekeeper;
use traffic_core::socket_table::spawn_negative_cache_housekeeper as spawn_socket_housekeeper;
use traffic_core::store::SqliteStore;
use traffic_core::{Accumulator, Resolver, Store};

use crate::capture;
use crate::config::TrafficConfig;
use crate::server;

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn handle_shutdown_signal(_: libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

pub fn run(config: &TrafficConfig) -> Result<()> {
    let uid = unsafe { libc::geteuid() };
    if uid != 0 {
        anyhow::bail!("trafficd run requires root privileges to capture packets");
    }

    let (capture_handle, interface_name) =
        capture::open_capture(config).context("failed to open capture device")?;
    let addrs = Arc::new(capture::address_set_for(&interface_name)?);

    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&config.db_path)
            .with_context(|| format!("opening store at {}", config.db_path.display()))?,
    );

    let resolver = Arc::new(Resolver::new(config.process_cache_size));
    let accumulator = Arc::new(Accumulator::new(config.interval));

    RUNNING.store(true, Ordering::SeqCst);
    unsafe {
        libc::signal(libc::SIGINT, handle_shutdown_signal as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_shutdown_signal as *const () as libc::sighandler_t);
    }
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        std::thread::spawn(move || {
            while RUNNING.load(Ordering::SeqCst) {
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            running.store(false, Ordering::SeqCst);
        });
    }

    eprintln!(
        "trafficd run — interface {interface_name}, deposit every {}s, db {}, query server on :{}",
        config.interval,
        config.db_path.display(),
        config.server_port,
    );

    let capture_thread = capture::spawn_capture_thread(
        capture_handle,
        addrs,
        resolver.clone(),
        accumulator.clone(),
        running.clone(),
    );
    let deposit_thread = spawn_deposit_loop(accumulator.clone(), store.clone(), running.clone());
    let socket_housekeeper = spawn_socket_housekeeper(resolver.sockets(), running.clone());
    let process_housekeeper = spawn_process_housekeeper(resolver.processes(), running.clone());
    let server_thread = server::spawn(config.server_port, accumulator, store, running.clone())?;

    capture_thread.join().ok();
    deposit_thread.join().ok();
    socket_housekeeper.join().ok();
    process_housekeeper.join().ok();
    server_thread.join().ok();

    Ok(())
}
