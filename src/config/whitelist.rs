use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read};
use std::net::IpAddr;
use std::path::Path;

/// Load the DDoS whitelist: one IP literal per line, blank lines and
/// `#` comments ignored. A missing or unreadable file logs a warning and
/// yields an empty whitelist.
pub fn load(path: impl AsRef<Path>) -> HashSet<IpAddr> {
    let path = path.as_ref();
    match std::fs::File::open(path) {
        Ok(file) => parse(file),
        Err(err) => {
            tracing::warn!("failed to open whitelist {}: {err}", path.display());
            HashSet::new()
        }
    }
}

pub fn parse(reader: impl Read) -> HashSet<IpAddr> {
    let mut entries = HashSet::new();
    for line in BufReader::new(reader).lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.parse::<IpAddr>() {
            Ok(ip) => {
                tracing::info!("whitelisting {ip}");
                entries.insert(ip);
            }
            Err(_) => tracing::warn!("skipping malformed whitelist entry {line:?}"),
        }
    }
    entries
}
