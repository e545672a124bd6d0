use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

/// Default bound on tracked URLs.
pub const MAX_RECORD_SIZE: usize = 1000;

struct Record {
    last_access: Instant,
    hits: u32,
}

/// Per-URL access counter with bounded LRU eviction.
///
/// One mutex serializes the whole update; the critical section never does
/// I/O. Overflow evicts the least-recently-accessed half of the table in
/// one batch so the cost amortizes to O(1) per access.
pub struct UrlTracker {
    records: Mutex<LruCache<String, Record>>,
    max_records: usize,
}

impl UrlTracker {
    pub fn new() -> Self {
        Self::with_capacity(MAX_RECORD_SIZE)
    }

    pub fn with_capacity(max_records: usize) -> Self {
        Self {
            records: Mutex::new(LruCache::unbounded()),
            max_records,
        }
    }

    /// Count an access of `url` and report whether it tripped the throttle:
    /// more than `threshold` accesses within one `window`.
    pub fn update_and_check(&self, url: &str, window: Duration, threshold: u32) -> bool {
        let mut records = self.records.lock().expect("tracker lock poisoned");
        let now = Instant::now();
        let mut attacked = false;

        match records.get_mut(url) {
            Some(record) => {
                if now <= record.last_access + window {
                    record.hits += 1;
                    if record.hits > threshold {
                        attacked = true;
                    }
                } else {
                    // Window expired, start counting afresh.
                    record.hits = 1;
                    record.last_access = now;
                }
            }
            None => {
                records.put(
                    url.to_string(),
                    Record {
                        last_access: now,
                        hits: 1,
                    },
                );
            }
        }

        if records.len() > self.max_records {
            while records.len() > self.max_records / 2 {
                match records.pop_lru() {
                    Some((evicted, _)) => tracing::debug!("evicting tracked url {evicted}"),
                    None => break,
                }
            }
        }

        attacked
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("tracker lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for UrlTracker {
    fn default() -> Self {
        Self::new()
    }
}
