use std::sync::{Arc, RwLock};
use std::time::Duration;

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod store;
pub mod utils;

use cache::CachePool;
use config::Settings;
use middleware::admission::{AdmissionQueue, WaitGroup};
use services::DdosGuard;
use store::StoreDriver;

/// Granularity of body reads and direct striped reads.
pub const BUFFER_SIZE: usize = 4 << 20;
/// A pending upload buffer is flushed to the store once it reaches this size.
pub const MAX_CHUNK_SIZE: usize = BUFFER_SIZE * 2;
/// Upper bound on async striped writes in flight per upload.
pub const AIO_CONCURRENT: usize = 4;
/// Hard cap on waiting for an admission slot.
pub const QUEUE_TIMEOUT: Duration = Duration::from_secs(5);

pub const STRIPE_UNIT: u64 = 512 << 10;
pub const OBJECT_SIZE: u64 = 4 << 20;
pub const STRIPE_COUNT: u64 = 4;

pub const MON_OP_TIMEOUT: Duration = Duration::from_secs(30);
pub const OSD_OP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StoreDriver>,
    pub cache: Arc<CachePool>,
    pub admission: AdmissionQueue,
    pub wait_group: WaitGroup,
    pub ddos: Option<Arc<DdosGuard>>,
    settings: Arc<RwLock<Arc<Settings>>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn StoreDriver>,
        cache: Arc<CachePool>,
        settings: Settings,
        ddos: Option<Arc<DdosGuard>>,
    ) -> Self {
        let admission = AdmissionQueue::new(settings.queue_length);
        Self {
            store,
            cache,
            admission,
            wait_group: WaitGroup::new(),
            ddos,
            settings: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    /// Immutable configuration snapshot for the current request.
    pub fn settings(&self) -> Arc<Settings> {
        self.settings.read().expect("settings lock poisoned").clone()
    }

    /// Install a freshly reloaded configuration. Only the signal loop calls
    /// this; in-flight requests keep the snapshot they already took.
    pub fn install_settings(&self, settings: Settings) {
        *self.settings.write().expect("settings lock poisoned") = Arc::new(settings);
    }
}
