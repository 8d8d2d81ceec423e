//! In-memory per-application traffic counters, drained to the [`crate::Store`]
//! on a fixed interval and optionally streamed live to at most one observer.
//!
//! The hand-off between the deposit loop and a `live` query client mirrors a
//! producer locking a mutex that a single waiting consumer blocks on: here
//! expressed with a `Condvar` rather than a raw signal, the idiomatic Rust
//! shape for "wake the one thread waiting on this state change".

use crate::packet::{Direction, Packet};
use std::collections::HashMap;
use std::sync::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficCell {
    pub bytes_rx: u64,
    pub bytes_tx: u64,
    pub pkt_rx: u64,
    pub pkt_tx: u64,
}

impl TrafficCell {
    pub fn empty(&self) -> bool {
        *self == TrafficCell::default()
    }
}

pub type TrafficMap = HashMap<String, TrafficCell>;

/// The pending delivery from one deposit to the one registered observer.
#[derive(Default)]
struct Delivery {
    map: Option<(TrafficMap, u64)>,
}

struct State {
    map: TrafficMap,
    observer_registered: bool,
    delivery: Delivery,
}

pub struct Accumulator {
    state: Mutex<State>,
    delivered: Condvar,
    interval_secs: u64,
}

impl Accumulator {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            state: Mutex::new(State {
                map: HashMap::new(),
                observer_registered: false,
                delivery: Delivery::default(),
            }),
            delivered: Condvar::new(),
            interval_secs,
        }
    }

    /// Hot path: update the counters for one resolved, non-discarded packet.
    pub fn add(&self, app_name: &str, pkt: &Packet) {
        let mut state = self.state.lock().unwrap();
        let cell = state.map.entry(app_name.to_string()).or_default();
        match pkt.direction {
            Direction::In => {
                cell.bytes_rx += pkt.length as u64;
                cell.pkt_rx += 1;
            }
            Direction::Out => {
                cell.bytes_tx += pkt.length as u64;
                cell.pkt_tx += 1;
            }
            Direction::Unknown => {}
        }
    }

    /// Deep-copy of the current map plus the configured interval, without
    /// waiting for the next deposit.
    pub fn snapshot(&self) -> (TrafficMap, u64) {
        let state = self.state.lock().unwrap();
        (state.map.clone(), self.interval_secs)
    }

    /// Register as the system's single `live` observer. Returns `false` if
    /// another observer is already registered.
    pub fn register_observer(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.observer_registered {
            return false;
        }
        state.observer_registered = true;
        true
    }

    /// Block until the next deposit releases a delivery for this observer.
    /// Must only be called by the thread that last succeeded at
    /// [`Accumulator::register_observer`].
    pub fn await_delivery(&self) -> (TrafficMap, u64) {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(delivery) = state.delivery.map.take() {
                return delivery;
            }
            state = self.delivered.wait(state).unwrap();
        }
    }

    /// Release the observer slot so another `live` client can register.
    pub fn unregister_observer(&self) {
        let mut state = self.state.lock().unwrap();
        state.observer_registered = false;
        state.delivery.map = None;
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    /// One full deposit tick: write non-empty cells to `store`, deliver to a
    /// registered observer if any, then clear the map. Returns the rows
    /// written (for logging/testing).
    ///
    /// A store write failure is logged and this interval's counters are
    /// still dropped (the map is cleared regardless) rather than retried on
    /// the next tick, to bound memory growth during a prolonged store
    /// outage rather than accumulating an unbounded backlog.
    pub fn deposit(&self, store: &dyn crate::store::Store, ts_unix: i64) -> anyhow::Result<usize> {
        let mut state = self.state.lock().unwrap();

        let rows: Vec<(String, TrafficCell)> = state
            .map
            .iter()
            .filter(|(_, cell)| !cell.empty())
            .map(|(name, cell)| (name.clone(), *cell))
            .collect();

        let write_result = store.deposit(ts_unix, &rows);

        if state.observer_registered {
            state.delivery.map = Some((state.map.clone(), self.interval_secs));
            self.delivered.notify_one();
        }

        state.map.clear();

        write_result?;
        Ok(rows.len())
    }
}

fn run_deposit(accumulator: &Accumulator, store: &dyn crate::store::Store) {
    let ts = chrono::Utc::now().timestamp();
    if let Err(e) = accumulator.deposit(store, ts) {
        tracing::error!("deposit failed, dropping this interval's counters: {e}");
    }
}

/// Spawn the background deposit loop. Rather than one blocking
/// `sleep(interval)` call — which would leave shutdown waiting out up to a
/// full interval — the wait is chopped into short polls of `running`, the
/// same pattern the negative-cache housekeepers use, so a signal is noticed
/// within one poll tick. Performs a final deposit after the loop exits so
/// the last partial interval isn't lost on shutdown.
pub fn spawn_deposit_loop(
    accumulator: std::sync::Arc<Accumulator>,
    store: std::sync::Arc<dyn crate::store::Store>,
    running: std::sync::Arc<std::sync::atomic::AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("deposit-loop".into())
        .spawn(move || {
            let interval = std::time::Duration::from_secs(accumulator.interval_secs().max(1));
            let poll = std::time::Duration::from_millis(100);
            let mut elapsed = std::time::Duration::ZERO;
            while running.load(std::sync::atomic::Ordering::SeqCst) {
                std::thread::sleep(poll);
                elapsed += poll;
                if elapsed >= interval {
                    elapsed = std::time::Duration::ZERO;
                    run_deposit(&accumulator, store.as_ref());
                }
            }
            run_deposit(&accumulator, store.as_ref());
        })
        .expect("failed to spawn deposit loop")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;
    use std::sync::Arc;

    struct NullStore;
    impl crate::store::Store for NullStore {
        fn deposit(&self, _ts: i64, _rows: &[(String, TrafficCell)]) -> anyhow::Result<()> {
            Ok(())
        }
        fn fetch_since(&self, _ts: i64) -> anyhow::Result<TrafficMap> {
            Ok(HashMap::new())
        }
        fn fetch_between(&self, _start: i64, _end: i64) -> anyhow::Result<TrafficMap> {
            Ok(HashMap::new())
        }
        fn list_apps(&self) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn pkt(dir: Direction, len: u32) -> Packet {
        Packet {
            kind: PacketType::Tcp,
            protocol: 6,
            src_ip: 1,
            dst_ip: 2,
            src_port: 1,
            dst_port: 2,
            length: len,
            ts: 0,
            direction: dir,
            discard: false,
        }
    }

    #[test]
    fn add_updates_correct_direction_counters() {
        let acc = Accumulator::new(10);
        acc.add("app", &pkt(Direction::In, 100));
        acc.add("app", &pkt(Direction::Out, 50));
        let (map, _) = acc.snapshot();
        let cell = map["app"];
        assert_eq!(cell.bytes_rx, 100);
        assert_eq!(cell.pkt_rx, 1);
        assert_eq!(cell.bytes_tx, 50);
        assert_eq!(cell.pkt_tx, 1);
    }

    #[test]
    fn deposit_clears_map_and_omits_empty_cells() {
        let acc = Accumulator::new(10);
        acc.add("app", &pkt(Direction::In, 10));
        let store = NullStore;
        let written = acc.deposit(&store, 1000).unwrap();
        assert_eq!(written, 1);
        let (map, _) = acc.snapshot();
        assert!(map.is_empty());
    }

    #[test]
    fn only_one_observer_may_register_at_a_time() {
        let acc = Accumulator::new(10);
        assert!(acc.register_observer());
        assert!(!acc.register_observer());
        acc.unregister_observer();
        assert!(acc.register_observer());
    }

    #[test]
    fn observer_receives_exactly_the_deposited_delta() {
        let acc = Arc::new(Accumulator::new(10));
        acc.add("app", &pkt(Direction::In, 42));
        assert!(acc.register_observer());

        let observer = {
            let acc = acc.clone();
            std::thread::spawn(move || acc.await_delivery())
        };

        // Give the observer thread a moment to start waiting; the Condvar
        // correctly handles the race either way but this keeps the test fast.
        std::thread::sleep(std::time::Duration::from_millis(20));

        let store = NullStore;
        acc.deposit(&store, 1000).unwrap();

        let (delivered_map, _) = observer.join().unwrap();
        assert_eq!(delivered_map["app"].bytes_rx, 42);

        let (map_after, _) = acc.snapshot();
        assert!(map_after.is_empty());
    }
}
