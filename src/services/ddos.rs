use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use super::{BlackSet, UrlTracker};

/// Composed DDoS filter: whitelist override, blackened-URL check, then the
/// access-rate tracker. A tripped URL is blackened before rejection so every
/// follow-up request short-circuits.
pub struct DdosGuard {
    whitelist: HashSet<IpAddr>,
    black_set: Arc<BlackSet>,
    tracker: UrlTracker,
}

impl DdosGuard {
    pub fn new(whitelist: HashSet<IpAddr>) -> Self {
        Self {
            whitelist,
            black_set: Arc::new(BlackSet::new()),
            tracker: UrlTracker::new(),
        }
    }

    pub fn black_set(&self) -> &Arc<BlackSet> {
        &self.black_set
    }

    /// `true` means refuse the request. `remote` is the socket peer address;
    /// forwarding headers deliberately carry no weight here.
    pub fn should_block(
        &self,
        remote: Option<IpAddr>,
        url: &str,
        window: Duration,
        threshold: u32,
    ) -> bool {
        if let Some(ip) = remote {
            if self.whitelist.contains(&ip) {
                return false;
            }
        }
        if self.black_set.check(url) {
            return true;
        }
        if self.tracker.update_and_check(url, window, threshold) {
            tracing::warn!("throttle tripped for {url}, blacklisting");
            self.black_set.set(url);
            return true;
        }
        false
    }
}
