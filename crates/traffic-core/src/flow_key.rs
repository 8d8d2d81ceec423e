//! Direction-invariant flow identifier.
//!
//! Packets for the same TCP connection arrive with src/dst swapped
//! depending on direction; `FlowKey` normalizes a packet's addresses into
//! (local, remote) so both directions hash identically — the same
//! normalization the kernel's own socket tables use (local first, remote
//! second). UDP keys on the local port alone: a connected UDP socket's
//! `/proc/net/udp` entry may list a single remote peer even though the
//! application fans packets out to many, so remote fields are zeroed.

use crate::packet::{Direction, Packet, PacketType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    local_ip: u32,
    local_port: u16,
    remote_ip: u32,
    remote_port: u16,
}

impl FlowKey {
    pub fn new(local_ip: u32, local_port: u16, remote_ip: u32, remote_port: u16) -> Self {
        Self { local_ip, local_port, remote_ip, remote_port }
    }

    /// Build the key the socket table would use for this protocol/ports —
    /// used when indexing parsed `/proc/net` entries.
    pub fn for_udp_local_port(local_port: u16) -> Self {
        Self { local_ip: 0, local_port, remote_ip: 0, remote_port: 0 }
    }

    /// Construct from a decoded, non-discarded packet.
    pub fn from_packet(pkt: &Packet) -> Self {
        let (local_ip, local_port, remote_ip, remote_port) = match pkt.direction {
            Direction::Out => (pkt.src_ip, pkt.src_port, pkt.dst_ip, pkt.dst_port),
            _ => (pkt.dst_ip, pkt.dst_port, pkt.src_ip, pkt.src_port),
        };

        match pkt.kind {
            PacketType::Udp => Self::for_udp_local_port(local_port),
            _ => Self { local_ip, local_port, remote_ip, remote_port },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_packet(dir: Direction, sip: u32, sport: u16, dip: u32, dport: u16) -> Packet {
        Packet {
            kind: PacketType::Tcp,
            protocol: 6,
            src_ip: sip,
            dst_ip: dip,
            src_port: sport,
            dst_port: dport,
            length: 60,
            ts: 0,
            direction: dir,
            discard: false,
        }
    }

    #[test]
    fn tcp_both_directions_hash_equal() {
        let out = tcp_packet(Direction::Out, 1, 51000, 2, 80);
        let inbound = tcp_packet(Direction::In, 2, 80, 1, 51000);
        assert_eq!(FlowKey::from_packet(&out), FlowKey::from_packet(&inbound));
    }

    #[test]
    fn udp_keys_only_on_local_port() {
        let mut a = tcp_packet(Direction::Out, 1, 45000, 9, 7);
        a.kind = PacketType::Udp;
        let mut b = tcp_packet(Direction::Out, 1, 45000, 99, 7);
        b.kind = PacketType::Udp;
        assert_eq!(FlowKey::from_packet(&a), FlowKey::from_packet(&b));
    }
}
