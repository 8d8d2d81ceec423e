//! Mirror of the kernel's per-protocol socket listings, keyed by
//! [`FlowKey`] so a captured packet can be mapped to the inode the kernel
//! associates with its socket.
//!
//! Grounded in the classic `/proc/net/{tcp,udp,raw}` line format: a
//! one-line header followed by whitespace-separated records where field 2
//! is `local_ip_hex:local_port_hex`, field 3 is
//! `remote_ip_hex:remote_port_hex`, and field 10 is the inode. IP hex is
//! the 32-bit little-endian representation on little-endian hosts, which
//! — read with a plain `from_str_radix` — already lands in the same raw,
//! as-captured byte order [`crate::packet::Packet`] uses, so no additional
//! byte-swap is needed.

use crate::flow_key::FlowKey;
use crate::packet::{Packet, PacketType};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct SocketEntry {
    pub local_ip: u32,
    pub remote_ip: u32,
    pub local_port: u16,
    pub remote_port: u16,
    pub inode: u64,
}

const INODE_FIELD_INDEX: usize = 9; // 10th whitespace-separated field

fn parse_hex_addr_port(field: &str) -> Option<(u32, u16)> {
    let (ip_hex, port_hex) = field.split_once(':')?;
    let ip = u32::from_str_radix(ip_hex, 16).ok()?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    Some((ip, port))
}

fn parse_line(line: &str) -> Option<SocketEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() <= INODE_FIELD_INDEX {
        return None;
    }
    let (local_ip, local_port) = parse_hex_addr_port(fields[1])?;
    let (remote_ip, remote_port) = parse_hex_addr_port(fields[2])?;
    let inode: u64 = fields[INODE_FIELD_INDEX].parse().ok()?;
    Some(SocketEntry { local_ip, remote_ip, local_port, remote_port, inode })
}

/// Which kernel listings feed a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Tcp4,
    Tcp6,
    Udp4,
    Raw,
}

impl Listing {
    fn path(self) -> &'static str {
        match self {
            Listing::Tcp4 => "/proc/net/tcp",
            Listing::Tcp6 => "/proc/net/tcp6",
            Listing::Udp4 => "/proc/net/udp",
            Listing::Raw => "/proc/net/raw",
        }
    }
}

struct Inner {
    map: HashMap<FlowKey, u64>,
    negative: HashSet<FlowKey>,
}

/// Mirror of the kernel's open-socket listings, keyed by [`FlowKey`].
pub struct SocketTable {
    inner: Mutex<Inner>,
}

impl Default for SocketTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { map: HashMap::new(), negative: HashSet::new() }),
        }
    }

    /// Refresh from the union of the given listings. Each listing is parsed
    /// in full and merged wholesale — a read failure on one listing never
    /// discards entries already merged from another.
    pub fn refresh(&self, listings: &[Listing]) {
        for listing in listings {
            let content = match std::fs::read_to_string(listing.path()) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!("socket listing {} unreadable: {e}", listing.path());
                    continue;
                }
            };

            let mut parsed: Vec<SocketEntry> = Vec::new();
            for line in content.lines().skip(1) {
                match parse_line(line) {
                    Some(entry) if entry.inode != 0 => parsed.push(entry),
                    Some(_) => {} // inode 0: socket in a closing state, excluded
                    None => tracing::warn!("malformed socket line in {}", listing.path()),
                }
            }

            let mut inner = self.inner.lock().unwrap();
            for entry in parsed {
                let key = if matches!(listing, Listing::Udp4) {
                    FlowKey::for_udp_local_port(entry.local_port)
                } else {
                    FlowKey::new(entry.local_ip, entry.local_port, entry.remote_ip, entry.remote_port)
                };
                inner.map.insert(key, entry.inode);
            }
        }
    }

    /// Resolve a decoded packet to a kernel socket inode, or 0 if none is
    /// known. Falls back to a targeted refresh of the relevant listing(s)
    /// on a miss before giving up.
    pub fn get(&self, pkt: &Packet) -> u64 {
        let key = FlowKey::from_packet(pkt);

        {
            let inner = self.inner.lock().unwrap();
            if inner.negative.contains(&key) {
                return 0;
            }
            if let Some(&inode) = inner.map.get(&key) {
                return inode;
            }
        }

        let targeted: &[Listing] = match pkt.kind {
            PacketType::Tcp => &[Listing::Tcp4, Listing::Tcp6],
            PacketType::Udp => &[Listing::Udp4],
            PacketType::Icmp => &[Listing::Raw],
            _ => return 0,
        };
        self.refresh(targeted);

        let mut inner = self.inner.lock().unwrap();
        if let Some(&inode) = inner.map.get(&key) {
            return inode;
        }
        inner.negative.insert(key);
        0
    }

    /// Clear the negative cache. Called by the 60s housekeeper.
    pub fn clear_negative_cache(&self) {
        self.inner.lock().unwrap().negative.clear();
    }
}

/// Spawn the 60-second housekeeper that clears the negative cache so
/// reused flows are rediscovered.
pub fn spawn_negative_cache_housekeeper(
    table: std::sync::Arc<SocketTable>,
    running: std::sync::Arc<std::sync::atomic::AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("socket-table-housekeeper".into())
        .spawn(move || {
            let tick = Duration::from_secs(60);
            let mut last = Instant::now();
            while running.load(std::sync::atomic::Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(500));
                if last.elapsed() >= tick {
                    table.clear_negative_cache();
                    last = Instant::now();
                }
            }
        })
        .expect("failed to spawn socket table housekeeper")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_tcp_line() {
        let line = "   0: 0100007F:1F90 0200000A:C350 01 00000000:00000000 00:00000000 00000000     0        0 12345 1 0000000000000000 100 0 0 10 0";
        let entry = parse_line(line).expect("should parse");
        assert_eq!(entry.local_port, 0x1F90);
        assert_eq!(entry.remote_port, 0xC350);
        assert_eq!(entry.inode, 12345);
    }

    #[test]
    fn skips_malformed_line() {
        assert!(parse_line("not a socket line").is_none());
    }

    #[test]
    fn zero_inode_is_excluded_by_refresh() {
        // Inode 0 means the socket is in a transitional (e.g. TIME_WAIT) state.
        let line = "   0: 0100007F:1F90 0200000A:C350 01 00000000:00000000 00:00000000 00000000     0        0 0 1 0000000000000000 100 0 0 10 0";
        let entry = parse_line(line).expect("should parse");
        assert_eq!(entry.inode, 0);
    }

    #[test]
    fn negative_cache_short_circuits_lookup() {
        let table = SocketTable::new();
        let key = FlowKey::for_udp_local_port(45000);
        table.inner.lock().unwrap().negative.insert(key);

        let pkt = Packet {
            kind: PacketType::Udp,
            protocol: 17,
            src_ip: 1,
            dst_ip: 2,
            src_port: 45000,
            dst_port: 7,
            length: 0,
            ts: 0,
            direction: crate::packet::Direction::Out,
            discard: false,
        };
        assert_eq!(table.get(&pkt), 0);
    }

    #[test]
    fn icmp_packet_triggers_raw_listing_refresh_not_tcp_or_udp() {
        // A miss on an ICMP packet should target only Listing::Raw; a
        // nonexistent path just means the refresh no-ops (warn + continue),
        // not a panic, and the packet still falls through to the negative
        // cache rather than being silently ignored.
        let table = SocketTable::new();
        let pkt = Packet {
            kind: PacketType::Icmp,
            protocol: 1,
            src_ip: 1,
            dst_ip: 2,
            src_port: 0,
            dst_port: 0,
            length: 0,
            ts: 0,
            direction: crate::packet::Direction::Out,
            discard: false,
        };
        assert_eq!(table.get(&pkt), 0);
        let key = FlowKey::from_packet(&pkt);
        assert!(table.inner.lock().unwrap().negative.contains(&key));
    }
}
