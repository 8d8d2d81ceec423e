//! Set of local IPv4 addresses bound to the capture interface.
//!
//! Populated once at startup from `getifaddrs`; frozen afterward and shared
//! by reference without locking. `contains` decides packet direction, so it
//! sits on the capture hot path — backed by a small fixed array rather than
//! a hash set.

use anyhow::{anyhow, Result};
use std::ffi::CStr;
use std::net::Ipv4Addr;

/// Arbitrary expected max of local IPv4 addresses on one interface.
const CAPACITY: usize = 64;

/// Frozen, ordered set of the capture interface's local IPv4 addresses.
pub struct AddressSet {
    ips: [u32; CAPACITY],
    len: usize,
}

impl AddressSet {
    /// Enumerate the given interface's IPv4 addresses via `getifaddrs`.
    ///
    /// The address whose first octet is 192 (private-range heuristic, the
    /// common case for LAN-facing interfaces) is promoted to index 0 so the
    /// hot `contains` path usually needs one comparison.
    pub fn for_interface(name: &str) -> Result<Self> {
        let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
        let rc = unsafe { libc::getifaddrs(&mut head) };
        if rc != 0 {
            return Err(anyhow!(
                "getifaddrs failed while enumerating addresses for interface {name}"
            ));
        }

        let mut found: Vec<u32> = Vec::new();
        let mut cur = head;
        while !cur.is_null() {
            let ifa = unsafe { &*cur };
            cur = ifa.ifa_next;

            if ifa.ifa_addr.is_null() || ifa.ifa_name.is_null() {
                continue;
            }
            let ifa_name = unsafe { CStr::from_ptr(ifa.ifa_name) };
            if ifa_name.to_string_lossy() != name {
                continue;
            }

            let family = unsafe { (*ifa.ifa_addr).sa_family } as i32;
            if family != libc::AF_INET {
                continue;
            }
            let sockaddr_in = ifa.ifa_addr as *const libc::sockaddr_in;
            let ip_be = unsafe { (*sockaddr_in).sin_addr.s_addr };
            found.push(ip_be);
        }
        unsafe { libc::freeifaddrs(head) };

        if found.is_empty() {
            return Err(anyhow!("no IPv4 addresses found on interface {name}"));
        }
        if found.len() > CAPACITY {
            found.truncate(CAPACITY);
        }

        // Promote the first private-range (192.x.x.x) address to the front.
        if let Some(pos) = found.iter().position(|&ip| first_octet(ip) == 192) {
            found.swap(0, pos);
        }

        let mut ips = [0u32; CAPACITY];
        let len = found.len();
        ips[..len].copy_from_slice(&found);
        Ok(Self { ips, len })
    }

    /// Build directly from a list of addresses, skipping interface enumeration.
    /// Used by tests and by callers that already resolved the interface.
    pub fn from_addrs(addrs: &[Ipv4Addr]) -> Self {
        let mut found: Vec<u32> = addrs.iter().map(|a| u32::from(*a).to_be()).collect();
        found.truncate(CAPACITY);
        if let Some(pos) = found.iter().position(|&ip| first_octet(ip) == 192) {
            found.swap(0, pos);
        }
        let mut ips = [0u32; CAPACITY];
        let len = found.len();
        ips[..len].copy_from_slice(&found);
        Self { ips, len }
    }

    /// Returns true if `ip` (network byte order) is a local address.
    #[inline]
    pub fn contains(&self, ip: u32) -> bool {
        if self.len == 0 {
            return false;
        }
        if self.ips[0] == ip {
            return true;
        }
        for &candidate in &self.ips[1..self.len] {
            if candidate == ip {
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn addrs(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.ips[..self.len].iter().map(|&be| Ipv4Addr::from(u32::from_be(be)))
    }
}

/// First octet of a network-byte-order-encoded IPv4 address.
fn first_octet(ip_be: u32) -> u8 {
    (ip_be & 0xff) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotes_private_range_to_front() {
        let set = AddressSet::from_addrs(&[
            "8.8.8.8".parse().unwrap(),
            "192.168.1.50".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
        ]);
        let first: Vec<Ipv4Addr> = set.addrs().take(1).collect();
        assert_eq!(first[0], "192.168.1.50".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn contains_checks_all_entries() {
        let set = AddressSet::from_addrs(&[
            "10.0.0.2".parse().unwrap(),
            "10.0.0.3".parse().unwrap(),
        ]);
        let a = u32::from("10.0.0.2".parse::<Ipv4Addr>().unwrap()).to_be();
        let b = u32::from("10.0.0.3".parse::<Ipv4Addr>().unwrap()).to_be();
        let c = u32::from("10.0.0.4".parse::<Ipv4Addr>().unwrap()).to_be();
        assert!(set.contains(a));
        assert!(set.contains(b));
        assert!(!set.contains(c));
    }

    #[test]
    fn empty_set_contains_nothing() {
        let set = AddressSet::from_addrs(&[]);
        assert!(!set.contains(0));
        assert!(set.is_empty());
    }
}
