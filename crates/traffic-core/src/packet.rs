//! Decode a raw captured frame into a typed [`Packet`] record.
//!
//! Mirrors the offset-table style used to parse binary wire formats
//! elsewhere in this workspace: named byte offsets, `from_*_bytes`
//! extraction, never a struct cast over the raw buffer. Decoding never
//! fails destructively — a malformed or uninteresting frame simply comes
//! back with `discard` set.
//!
//! IP addresses are kept in their raw, as-captured network-byte-order
//! representation throughout this crate (the same convention the kernel's
//! own socket tables use), so no host/network conversion is needed to
//! compare a decoded packet's addresses against [`crate::AddressSet`] or a
//! [`crate::SocketEntry`]. Ports are converted to host order at decode time
//! since `/proc/net` hex fields are effectively pre-converted already.

use crate::address_set::AddressSet;

const ETH_HEADER_LEN: usize = 14;
const ETHERTYPE_IPV4: u16 = 0x0800;
const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;
const IPPROTO_ICMP: u8 = 1;

const UDP_HEADER_LEN: usize = 8;
const ICMP_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Unknown,
    Tcp,
    Udp,
    Icmp,
    Dns,
    Ssdp,
    Ntp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Unknown,
    In,
    Out,
}

/// A single decoded frame. Lives only for the duration of one capture
/// callback; never retained.
#[derive(Debug, Clone)]
pub struct Packet {
    pub kind: PacketType,
    pub protocol: u8,
    pub src_ip: u32,
    pub dst_ip: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u32,
    pub ts: i64,
    pub direction: Direction,
    pub discard: bool,
}

impl Packet {
    fn discarded(ts: i64, length: u32) -> Self {
        Self {
            kind: PacketType::Unknown,
            protocol: 0,
            src_ip: 0,
            dst_ip: 0,
            src_port: 0,
            dst_port: 0,
            length,
            ts,
            direction: Direction::Unknown,
            discard: true,
        }
    }

    /// Decode one captured frame. `ts` is the capture timestamp in unix
    /// seconds, `wire_len` the original on-wire length (may exceed
    /// `frame.len()` if the capture snaplen truncated it).
    pub fn decode(ts: i64, wire_len: u32, frame: &[u8], addrs: &AddressSet) -> Packet {
        if frame.len() < ETH_HEADER_LEN + 20 {
            return Packet::discarded(ts, wire_len);
        }

        let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
        if ethertype != ETHERTYPE_IPV4 {
            return Packet::discarded(ts, wire_len);
        }

        let ip_start = ETH_HEADER_LEN;
        let ihl = (frame[ip_start] & 0x0f) as usize * 4;
        if ihl < 20 || frame.len() < ip_start + ihl {
            return Packet::discarded(ts, wire_len);
        }

        let protocol = frame[ip_start + 9];
        if !matches!(protocol, IPPROTO_TCP | IPPROTO_UDP | IPPROTO_ICMP) {
            return Packet::discarded(ts, wire_len);
        }

        let src_ip = u32::from_ne_bytes(frame[ip_start + 12..ip_start + 16].try_into().unwrap());
        let dst_ip = u32::from_ne_bytes(frame[ip_start + 16..ip_start + 20].try_into().unwrap());

        let direction = if addrs.contains(src_ip) {
            Direction::Out
        } else if addrs.contains(dst_ip) {
            Direction::In
        } else {
            return Packet::discarded(ts, wire_len);
        };

        let payload = &frame[ip_start + ihl..];
        let mut pkt = Packet {
            kind: PacketType::Unknown,
            protocol,
            src_ip,
            dst_ip,
            src_port: 0,
            dst_port: 0,
            length: wire_len,
            ts,
            direction,
            discard: false,
        };

        match protocol {
            IPPROTO_TCP => {
                if payload.len() < 4 {
                    pkt.discard = true;
                    return pkt;
                }
                pkt.kind = PacketType::Tcp;
                pkt.src_port = u16::from_be_bytes([payload[0], payload[1]]);
                pkt.dst_port = u16::from_be_bytes([payload[2], payload[3]]);
            }
            IPPROTO_UDP => {
                if payload.len() < UDP_HEADER_LEN {
                    pkt.discard = true;
                    return pkt;
                }
                pkt.kind = PacketType::Udp;
                pkt.src_port = u16::from_be_bytes([payload[0], payload[1]]);
                pkt.dst_port = u16::from_be_bytes([payload[2], payload[3]]);
                classify_udp(&mut pkt);
            }
            IPPROTO_ICMP => {
                if payload.len() < ICMP_HEADER_LEN {
                    pkt.discard = true;
                    return pkt;
                }
                pkt.kind = PacketType::Icmp;
                pkt.src_port = 0;
                pkt.dst_port = 0;
            }
            _ => unreachable!("filtered above"),
        }

        pkt
    }
}

/// Reclassify a UDP packet as housekeeping traffic (DNS/SSDP/NTP) by
/// well-known port and mark it for discard — these are not worth
/// attributing per spec.
fn classify_udp(pkt: &mut Packet) {
    let (sp, dp) = (pkt.src_port, pkt.dst_port);
    if sp == 53 || dp == 53 || (sp == 5353 && dp == 5353) {
        pkt.kind = PacketType::Dns;
        pkt.discard = true;
    } else if sp == 1900 || dp == 1900 {
        pkt.kind = PacketType::Ssdp;
        pkt.discard = true;
    } else if sp == 123 && dp == 123 {
        pkt.kind = PacketType::Ntp;
        pkt.discard = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addrs() -> AddressSet {
        AddressSet::from_addrs(&["10.0.0.2".parse::<Ipv4Addr>().unwrap()])
    }

    /// Build a minimal Ethernet+IPv4+TCP frame for tests.
    fn tcp_frame(src: &str, sport: u16, dst: &str, dport: u16, payload_len: usize) -> Vec<u8> {
        let mut frame = vec![0u8; ETH_HEADER_LEN];
        frame[12] = 0x08;
        frame[13] = 0x00; // ethertype IPv4

        let src_ip: Ipv4Addr = src.parse().unwrap();
        let dst_ip: Ipv4Addr = dst.parse().unwrap();

        let mut ip = vec![0u8; 20];
        ip[0] = 0x45; // version 4, ihl 5
        ip[9] = IPPROTO_TCP;
        ip[12..16].copy_from_slice(&src_ip.octets());
        ip[16..20].copy_from_slice(&dst_ip.octets());
        frame.extend_from_slice(&ip);

        let mut tcp = vec![0u8; 20 + payload_len];
        tcp[0..2].copy_from_slice(&sport.to_be_bytes());
        tcp[2..4].copy_from_slice(&dport.to_be_bytes());
        frame.extend_from_slice(&tcp);

        frame
    }

    #[test]
    fn outgoing_tcp_decodes_direction_and_ports() {
        let frame = tcp_frame("10.0.0.2", 51000, "10.0.0.1", 80, 6);
        let pkt = Packet::decode(1000, frame.len() as u32, &frame, &addrs());
        assert!(!pkt.discard);
        assert_eq!(pkt.kind, PacketType::Tcp);
        assert_eq!(pkt.direction, Direction::Out);
        assert_eq!(pkt.src_port, 51000);
        assert_eq!(pkt.dst_port, 80);
    }

    #[test]
    fn incoming_tcp_direction() {
        let frame = tcp_frame("10.0.0.1", 80, "10.0.0.2", 51000, 0);
        let pkt = Packet::decode(1000, frame.len() as u32, &frame, &addrs());
        assert!(!pkt.discard);
        assert_eq!(pkt.direction, Direction::In);
    }

    #[test]
    fn foreign_traffic_is_discarded() {
        let frame = tcp_frame("8.8.8.8", 443, "1.1.1.1", 51000, 0);
        let pkt = Packet::decode(1000, frame.len() as u32, &frame, &addrs());
        assert!(pkt.discard);
    }

    #[test]
    fn truncated_frame_is_discarded_not_panicking() {
        let frame = vec![0u8; 10];
        let pkt = Packet::decode(1000, 10, &frame, &addrs());
        assert!(pkt.discard);
    }

    #[test]
    fn dns_udp_is_discarded() {
        let mut frame = vec![0u8; ETH_HEADER_LEN];
        frame[12] = 0x08;
        frame[13] = 0x00;
        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[9] = IPPROTO_UDP;
        ip[12..16].copy_from_slice(&"10.0.0.2".parse::<Ipv4Addr>().unwrap().octets());
        ip[16..20].copy_from_slice(&"8.8.8.8".parse::<Ipv4Addr>().unwrap().octets());
        frame.extend_from_slice(&ip);
        let mut udp = vec![0u8; 8];
        udp[0..2].copy_from_slice(&40000u16.to_be_bytes());
        udp[2..4].copy_from_slice(&53u16.to_be_bytes());
        frame.extend_from_slice(&udp);

        let pkt = Packet::decode(1000, frame.len() as u32, &frame, &addrs());
        assert_eq!(pkt.kind, PacketType::Dns);
        assert!(pkt.discard);
    }

    #[test]
    fn non_ipv4_ethertype_is_discarded() {
        let mut frame = vec![0u8; ETH_HEADER_LEN + 20];
        frame[12] = 0x86;
        frame[13] = 0xdd; // IPv6 ethertype
        let pkt = Packet::decode(1000, frame.len() as u32, &frame, &addrs());
        assert!(pkt.discard);
    }
}
