use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A blackened URL stays refused for this long.
pub const EXPIRY: Duration = Duration::from_secs(60 * 60);
/// Cadence of the background expiry sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Time-expiring set of URLs currently refused service.
#[derive(Default)]
pub struct BlackSet {
    entries: Mutex<HashMap<String, Instant>>,
}

impl BlackSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, url: &str) -> bool {
        self.entries
            .lock()
            .expect("black set lock poisoned")
            .contains_key(url)
    }

    pub fn set(&self, url: &str) {
        self.entries
            .lock()
            .expect("black set lock poisoned")
            .insert(url.to_string(), Instant::now());
    }

    /// Drop entries older than [`EXPIRY`]. Expired keys are snapshotted
    /// first, then removed, so the lock is held for one short pass.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("black set lock poisoned");
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, inserted)| now.duration_since(**inserted) >= EXPIRY)
            .map(|(url, _)| url.clone())
            .collect();
        for url in expired {
            tracing::info!("unblacklisting {url}");
            entries.remove(&url);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("black set lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let set = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                set.sweep();
            }
        })
    }
}
