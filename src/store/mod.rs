//! Driver interface for the striped object store.
//!
//! The gateway only ever talks to the cluster through these traits: a pool
//! handle, a striper view over it, and async write completions that are
//! awaited in submission order. A librados-backed driver plugs in behind
//! the same seam; [`mem::MemStore`] backs tests and standalone operation.

mod mem;

pub use mem::MemStore;

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::{MON_OP_TIMEOUT, OBJECT_SIZE, OSD_OP_TIMEOUT, STRIPE_COUNT, STRIPE_UNIT};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,
    #[error("pool {0:?} not found")]
    PoolNotFound(String),
    #[error("operation timed out")]
    Timeout,
    #[error("async operation aborted")]
    Aborted,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Fixed stripe geometry applied to every upload striper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripeLayout {
    pub stripe_unit: u64,
    pub object_size: u64,
    pub stripe_count: u64,
}

impl Default for StripeLayout {
    fn default() -> Self {
        Self {
            stripe_unit: STRIPE_UNIT,
            object_size: OBJECT_SIZE,
            stripe_count: STRIPE_COUNT,
        }
    }
}

/// Connection-level operation timeouts, the mon/osd knobs of the cluster
/// client.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub mon_op_timeout: Duration,
    pub osd_op_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            mon_op_timeout: MON_OP_TIMEOUT,
            osd_op_timeout: OSD_OP_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ObjectState {
    pub size: u64,
    pub mtime: SystemTime,
}

#[async_trait]
pub trait StoreDriver: Send + Sync {
    async fn open_pool(&self, name: &str) -> Result<Box<dyn Pool>, StoreError>;
    /// Cluster health probe, rendered verbatim on `/cephstatus`.
    async fn status(&self) -> Result<String, StoreError>;
}

#[async_trait]
pub trait Pool: Send + Sync {
    async fn create_striper(&self) -> Result<Box<dyn Striper>, StoreError>;
}

#[async_trait]
pub trait Striper: Send + Sync {
    fn set_layout(&mut self, layout: StripeLayout) -> Result<(), StoreError>;

    async fn state(&self, oid: &str) -> Result<ObjectState, StoreError>;

    /// Read up to `len` bytes at `offset`. An empty buffer means end of
    /// object.
    async fn read(&self, oid: &str, offset: u64, len: usize) -> Result<Bytes, StoreError>;

    /// Submit an async striped write. The returned completion resolves once
    /// the store has acknowledged the write.
    fn write_aio(&self, oid: &str, data: Bytes, offset: u64) -> Result<Completion, StoreError>;

    async fn remove(&self, oid: &str) -> Result<(), StoreError>;
}

/// Handle for one outstanding async write.
///
/// `is_complete` polls without consuming the result; `wait` consumes the
/// handle and yields the store's verdict. Dropping an unawaited completion
/// abandons the result but never the write itself.
pub struct Completion {
    rx: oneshot::Receiver<Result<(), StoreError>>,
    ready: Option<Result<(), StoreError>>,
}

impl Completion {
    pub fn channel() -> (oneshot::Sender<Result<(), StoreError>>, Completion) {
        let (tx, rx) = oneshot::channel();
        (tx, Completion { rx, ready: None })
    }

    pub fn is_complete(&mut self) -> bool {
        if self.ready.is_some() {
            return true;
        }
        match self.rx.try_recv() {
            Ok(result) => {
                self.ready = Some(result);
                true
            }
            Err(oneshot::error::TryRecvError::Empty) => false,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.ready = Some(Err(StoreError::Aborted));
                true
            }
        }
    }

    pub async fn wait(mut self) -> Result<(), StoreError> {
        if let Some(result) = self.ready.take() {
            return result;
        }
        self.rx.await.unwrap_or(Err(StoreError::Aborted))
    }
}
