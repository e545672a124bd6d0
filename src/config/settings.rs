use std::io::Read;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Gateway configuration, deserialized from the JSON config file.
///
/// Field names on the wire are the historical ones (`CacheSizeMBytes`,
/// `MyIPAddr`, ...), so every field carries an explicit rename.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(rename = "Name")]
    pub name: String,

    /// Max per-node memory used by the group cache.
    #[serde(rename = "CacheSizeMBytes")]
    pub cache_size_mbytes: u64,
    #[serde(rename = "CacheChunkSizeKBytes")]
    pub cache_chunk_size_kbytes: u64,
    /// Objects at most this large are served through the group cache.
    #[serde(rename = "CacheMaxObjectSizeKBytes")]
    pub cache_max_object_size_kbytes: u64,

    #[serde(rename = "MyIPAddr")]
    pub my_ip_addr: String,
    /// Peer-to-peer port of the group cache.
    #[serde(rename = "Port")]
    pub port: u16,
    /// IP addresses of all gateway nodes.
    #[serde(rename = "Peers")]
    pub peers: Vec<String>,

    #[serde(rename = "ListenPort")]
    pub listen_port: u16,
    /// Per-connection read/write timeout, in seconds.
    #[serde(rename = "SocketTimeout")]
    pub socket_timeout: u64,
    #[serde(rename = "QueueLength")]
    pub queue_length: usize,

    #[serde(rename = "SecretKey")]
    pub secret_key: String,

    #[serde(rename = "DDos")]
    pub ddos: bool,
    /// Accesses within this window (seconds) count toward the throttle.
    #[serde(rename = "ThrottleInterval")]
    pub throttle_interval: u64,
    /// Accesses above this count within one window trip the throttle.
    #[serde(rename = "ThrottleNums")]
    pub throttle_nums: u32,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open config file {}", path.display()))?;
        Self::from_reader(file)
    }

    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut raw = String::new();
        reader.read_to_string(&mut raw)?;
        let mut settings: Settings =
            serde_json::from_str(&raw).context("failed to parse config file")?;
        settings.normalize();
        Ok(settings)
    }

    /// The local node must be a member of the peer set.
    fn normalize(&mut self) {
        if !self.peers.iter().any(|p| *p == self.my_ip_addr) {
            self.peers.push(self.my_ip_addr.clone());
        }
    }

    pub fn cache_budget_bytes(&self) -> u64 {
        self.cache_size_mbytes * 1024 * 1024
    }

    pub fn cache_chunk_bytes(&self) -> usize {
        (self.cache_chunk_size_kbytes * 1024) as usize
    }

    pub fn cache_max_object_bytes(&self) -> u64 {
        self.cache_max_object_size_kbytes * 1024
    }

    pub fn throttle_window(&self) -> Duration {
        Duration::from_secs(self.throttle_interval)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout)
    }
}
