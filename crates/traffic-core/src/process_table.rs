//! Mirror of the kernel's process table, keyed by the socket inodes each
//! process holds open, so a [`crate::SocketTable`] inode lookup can be
//! turned into an owning process name.
//!
//! Two structures back this: an unbounded `by_inode` map, populated as a
//! side effect of every scan (not just for the inode being searched for),
//! and a bounded LRU of "productive" pids. A lookup first replays the
//! cached-pid pass — re-scanning only pids that have resolved an inode
//! before, newest-used first — before falling back to a full `/proc` scan,
//! newest pid first (new connections are disproportionately likely to
//! belong to a process that just started talking). A negative cache
//! absorbs repeated misses for inodes with no owning process (e.g. kernel
//! sockets) until the next periodic clear.

use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Process {
    pub pid: u32,
    /// Shared so every socket owned by the same process during one scan
    /// clones a refcount, not a fresh string.
    pub name: Arc<str>,
}

struct Inner {
    /// inode -> owning process. Unbounded: every socket fd seen during any
    /// scan is recorded here, not just the one that was searched for.
    by_inode: HashMap<u64, Process>,
    /// Pids that have resolved an inode before, most-recently-used first.
    /// `None` when `process_cache_size == 0`, which disables the cache
    /// entirely rather than silently flooring it at capacity 1.
    recent_pids: Option<LruCache<u32, ()>>,
    /// Inodes we failed to resolve since the last clear.
    unfindable: HashSet<u64>,
}

pub struct ProcessTable {
    inner: Mutex<Inner>,
}

impl ProcessTable {
    pub fn new(capacity: usize) -> Self {
        let recent_pids = NonZeroUsize::new(capacity).map(LruCache::new);
        Self {
            inner: Mutex::new(Inner {
                by_inode: HashMap::new(),
                recent_pids,
                unfindable: HashSet::new(),
            }),
        }
    }

    /// Resolve a socket inode to its owning process, scanning `/proc` if
    /// neither `by_inode` nor the negative cache already has an answer.
    pub fn resolve(&self, inode: u64) -> Option<Process> {
        {
            let inner = self.inner.lock().unwrap();
            if inner.unfindable.contains(&inode) {
                return None;
            }
            if let Some(p) = inner.by_inode.get(&inode) {
                return Some(p.clone());
            }
        }

        match self.search(inode) {
            Some(process) => {
                let mut inner = self.inner.lock().unwrap();
                inner.unfindable.remove(&inode);
                inner.by_inode.insert(inode, process.clone());
                if let Some(lru) = inner.recent_pids.as_mut() {
                    lru.put(process.pid, ());
                }
                Some(process)
            }
            None => {
                let mut inner = self.inner.lock().unwrap();
                inner.unfindable.insert(inode);
                None
            }
        }
    }

    /// Cached-pid pass, then a newest-first full scan of every other pid.
    fn search(&self, inode: u64) -> Option<Process> {
        let cached_pids: Vec<u32> = {
            let inner = self.inner.lock().unwrap();
            inner
                .recent_pids
                .as_ref()
                .map(|lru| lru.iter().map(|(pid, ())| *pid).collect())
                .unwrap_or_default()
        };

        let mut vanished = Vec::new();
        for pid in &cached_pids {
            match scan_pid(*pid, inode) {
                PidScan::Vanished => vanished.push(*pid),
                PidScan::Scanned { found, discovered } => {
                    self.merge_discovered(discovered);
                    if let Some(process) = found {
                        self.evict_vanished(&vanished);
                        return Some(process);
                    }
                }
            }
        }
        self.evict_vanished(&vanished);

        let mut pids: Vec<u32> = std::fs::read_dir("/proc")
            .ok()?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str()?.parse::<u32>().ok())
            .filter(|pid| !cached_pids.contains(pid))
            .collect();
        // Newest pids are typically the highest-numbered ones (allowing for
        // wraparound, which is rare enough in practice not to special-case).
        pids.sort_unstable_by(|a, b| b.cmp(a));

        for pid in pids {
            if let PidScan::Scanned { found, discovered } = scan_pid(pid, inode) {
                self.merge_discovered(discovered);
                if let Some(process) = found {
                    return Some(process);
                }
            }
        }
        None
    }

    fn merge_discovered(&self, discovered: Vec<(u64, Process)>) {
        if discovered.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        for (inode, process) in discovered {
            inner.by_inode.insert(inode, process);
        }
    }

    fn evict_vanished(&self, vanished: &[u32]) {
        if vanished.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(lru) = inner.recent_pids.as_mut() {
            for pid in vanished {
                lru.pop(pid);
            }
        }
    }

    pub fn clear_negative_cache(&self) {
        self.inner.lock().unwrap().unfindable.clear();
    }
}

enum PidScan {
    /// The process directory vanished mid-scan (race with exit).
    Vanished,
    Scanned {
        found: Option<Process>,
        /// Every socket inode discovered on this pid, for `by_inode`.
        discovered: Vec<(u64, Process)>,
    },
}

/// Enumerate `/proc/<pid>/fd/*`, recording every socket fd found (not just
/// `target`) so a single scan pays off for every inode that pid owns.
fn scan_pid(pid: u32, target: u64) -> PidScan {
    let fd_dir = format!("/proc/{pid}/fd");
    let entries = match std::fs::read_dir(&fd_dir) {
        Ok(e) => e,
        Err(_) => return PidScan::Vanished,
    };
    let Some(name) = read_comm(pid) else {
        return PidScan::Vanished;
    };
    let name: Arc<str> = Arc::from(name);

    let mut discovered = Vec::new();
    let mut found = None;
    for entry in entries.filter_map(|e| e.ok()) {
        let Ok(link) = std::fs::read_link(entry.path()) else {
            continue;
        };
        let Some(inode) = parse_socket_inode(&link.to_string_lossy()) else {
            continue;
        };
        let process = Process { pid, name: name.clone() };
        if inode == target {
            found = Some(process.clone());
        }
        discovered.push((inode, process));
    }
    PidScan::Scanned { found, discovered }
}

fn parse_socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

fn read_comm(pid: u32) -> Option<String> {
    let raw = std::fs::read_to_string(format!("/proc/{pid}/comm")).ok()?;
    Some(raw.trim_end().to_string())
}

/// Spawn the 60-second housekeeper that clears the negative cache.
pub fn spawn_negative_cache_housekeeper(
    table: std::sync::Arc<ProcessTable>,
    running: std::sync::Arc<std::sync::atomic::AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("process-table-housekeeper".into())
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
        .expect("failed to spawn process table housekeeper")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_pid_resolves_to_own_comm() {
        // Our own stdio fds aren't sockets, but we can at least verify the
        // comm file read path works for a pid we know exists: ourselves.
        let comm = read_comm(std::process::id());
        assert!(comm.is_some());
    }

    #[test]
    fn unknown_inode_goes_to_negative_cache() {
        let table = ProcessTable::new(4);
        let resolved = table.resolve(u64::MAX);
        assert!(resolved.is_none());
        assert!(table.inner.lock().unwrap().unfindable.contains(&u64::MAX));
    }

    #[test]
    fn clearing_negative_cache_forgets_misses() {
        let table = ProcessTable::new(4);
        let _ = table.resolve(u64::MAX);
        table.clear_negative_cache();
        assert!(table.inner.lock().unwrap().unfindable.is_empty());
    }

    #[test]
    fn zero_capacity_disables_recent_pids_cache() {
        let table = ProcessTable::new(0);
        assert!(table.inner.lock().unwrap().recent_pids.is_none());
    }

    #[test]
    fn parses_socket_inode_from_link_target() {
        assert_eq!(parse_socket_inode("socket:[12345]"), Some(12345));
        assert_eq!(parse_socket_inode("pipe:[99]"), None);
        assert_eq!(parse_socket_inode("/dev/null"), None);
    }

    #[test]
    fn scanning_own_pid_populates_by_inode_for_every_fd_found() {
        // Exercise the real scan against our own process: whatever sockets
        // this test binary has open get recorded in by_inode as a side
        // effect, even though we search for an inode that won't match.
        let table = ProcessTable::new(4);
        let _ = table.search(u64::MAX);
        // No assertion on contents (the test process may hold zero sockets),
        // just confirm the scan path runs without panicking and leaves the
        // table in a consistent state.
        assert!(table.inner.lock().unwrap().unfindable.is_empty());
    }
}
