//! Composes [`SocketTable`] and [`ProcessTable`] to attribute a decoded
//! packet to an owning application name.
//!
//! Traffic that cannot be attributed — no matching socket, or a socket
//! with no resolvable owning process — is folded into a sentinel
//! "Unknown Traffic" bucket (pid 0) rather than dropped, so its bytes are
//! still visible in totals.

use crate::packet::Packet;
use crate::process_table::{Process, ProcessTable};
use crate::socket_table::SocketTable;
use std::sync::{Arc, LazyLock};

/// Name used for traffic that could not be attributed to a process.
pub const UNKNOWN_TRAFFIC: &str = "Unknown Traffic";

/// Built once; unattributed packets clone a `pid`/`String` pair rather than
/// allocating a fresh sentinel per packet.
static UNKNOWN: LazyLock<Process> =
    LazyLock::new(|| Process { pid: 0, name: std::sync::Arc::from(UNKNOWN_TRAFFIC) });

fn unknown() -> Process {
    UNKNOWN.clone()
}

pub struct Resolver {
    sockets: Arc<SocketTable>,
    processes: Arc<ProcessTable>,
}

impl Resolver {
    pub fn new(process_cache_size: usize) -> Self {
        Self {
            sockets: Arc::new(SocketTable::new()),
            processes: Arc::new(ProcessTable::new(process_cache_size)),
        }
    }

    /// Attribute a decoded, non-discarded packet to a process. Never fails:
    /// falls back to [`UNKNOWN_TRAFFIC`] for anything unresolvable.
    pub fn resolve(&self, pkt: &Packet) -> Process {
        let inode = self.sockets.get(pkt);
        if inode == 0 {
            return unknown();
        }
        self.processes.resolve(inode).unwrap_or_else(unknown)
    }

    /// Shared handle to the socket table, for the negative-cache housekeeper.
    pub fn sockets(&self) -> Arc<SocketTable> {
        self.sockets.clone()
    }

    /// Shared handle to the process table, for the negative-cache housekeeper.
    pub fn processes(&self) -> Arc<ProcessTable> {
        self.processes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Direction, PacketType};

    fn icmp_packet() -> Packet {
        Packet {
            kind: PacketType::Icmp,
            protocol: 1,
            src_ip: 1,
            dst_ip: 2,
            src_port: 0,
            dst_port: 0,
            length: 64,
            ts: 0,
            direction: Direction::Out,
            discard: false,
        }
    }

    #[test]
    fn unresolvable_packet_falls_back_to_sentinel() {
        let resolver = Resolver::new(16);
        let process = resolver.resolve(&icmp_packet());
        assert_eq!(process.pid, 0);
        assert_eq!(&*process.name, UNKNOWN_TRAFFIC);
    }
}
