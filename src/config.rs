//! `trafficd.toml` configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level daemon configuration, per §6 "Configuration options consumed
/// by the core".
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrafficConfig {
    /// Deposit cadence in seconds.
    #[serde(default = "TrafficConfig::default_interval")]
    pub interval: u64,
    /// Capture interface name. Empty means "first enumerated device".
    #[serde(default)]
    pub interface: String,
    #[serde(default = "TrafficConfig::default_true")]
    pub promiscuous: bool,
    #[serde(default = "TrafficConfig::default_true")]
    pub immediate: bool,
    /// Size of the productive-PID LRU in `ProcessTable`.
    #[serde(default = "TrafficConfig::default_process_cache_size")]
    pub process_cache_size: usize,
    #[serde(default = "TrafficConfig::default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "TrafficConfig::default_server_port")]
    pub server_port: u16,
}

impl TrafficConfig {
    fn default_interval() -> u64 {
        10
    }
    fn default_true() -> bool {
        true
    }
    fn default_process_cache_size() -> usize {
        5
    }
    fn default_db_path() -> PathBuf {
        PathBuf::from("trafficd.db")
    }
    fn default_server_port() -> u16 {
        13889
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let cfg: Self = toml::from_str(&text)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn default_example() -> Self {
        Self {
            interval: Self::default_interval(),
            interface: String::new(),
            promiscuous: Self::default_true(),
            immediate: Self::default_true(),
            process_cache_size: Self::default_process_cache_size(),
            db_path: Self::default_db_path(),
            server_port: Self::default_server_port(),
        }
    }
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self::default_example()
    }
}
