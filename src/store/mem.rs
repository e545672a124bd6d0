//! In-memory store driver.
//!
//! Backs the test suite and standalone deployments. Pools are created on
//! first open; objects honor sparse offset writes the way the striped
//! cluster does (gaps read back as zeros).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

use super::{
    Completion, ObjectState, Pool, StoreDriver, StoreError, StoreOptions, StripeLayout, Striper,
};

#[derive(Default)]
struct ObjectData {
    data: Vec<u8>,
    mtime: Option<SystemTime>,
}

#[derive(Default)]
struct PoolData {
    objects: RwLock<HashMap<String, ObjectData>>,
}

impl PoolData {
    fn write_at(&self, oid: &str, data: &[u8], offset: u64) {
        let mut objects = self.objects.write().expect("pool lock poisoned");
        let object = objects.entry(oid.to_string()).or_default();
        let end = offset as usize + data.len();
        if object.data.len() < end {
            object.data.resize(end, 0);
        }
        object.data[offset as usize..end].copy_from_slice(data);
        object.mtime = Some(SystemTime::now());
    }
}

pub struct MemStore {
    pools: RwLock<HashMap<String, Arc<PoolData>>>,
    opts: StoreOptions,
}

impl MemStore {
    pub fn connect(opts: StoreOptions) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            opts,
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::connect(StoreOptions::default())
    }
}

#[async_trait]
impl StoreDriver for MemStore {
    async fn open_pool(&self, name: &str) -> Result<Box<dyn Pool>, StoreError> {
        let pool = self
            .pools
            .write()
            .expect("store lock poisoned")
            .entry(name.to_string())
            .or_default()
            .clone();
        Ok(Box::new(MemPool {
            data: pool,
            opts: self.opts,
        }))
    }

    async fn status(&self) -> Result<String, StoreError> {
        let pools = self.pools.read().expect("store lock poisoned");
        let objects: usize = pools
            .values()
            .map(|p| p.objects.read().expect("pool lock poisoned").len())
            .sum();
        Ok(format!(
            "HEALTH_OK pools={} objects={objects}",
            pools.len()
        ))
    }
}

struct MemPool {
    data: Arc<PoolData>,
    opts: StoreOptions,
}

#[async_trait]
impl Pool for MemPool {
    async fn create_striper(&self) -> Result<Box<dyn Striper>, StoreError> {
        Ok(Box::new(MemStriper {
            pool: self.data.clone(),
            opts: self.opts,
        }))
    }
}

struct MemStriper {
    pool: Arc<PoolData>,
    opts: StoreOptions,
}

#[async_trait]
impl Striper for MemStriper {
    // The layout only affects placement in a real cluster; the in-memory
    // representation is flat, so validation is all there is to do.
    fn set_layout(&mut self, layout: StripeLayout) -> Result<(), StoreError> {
        if layout.stripe_unit == 0 || layout.stripe_count == 0 || layout.object_size == 0 {
            return Err(StoreError::Backend("degenerate stripe layout".into()));
        }
        Ok(())
    }

    async fn state(&self, oid: &str) -> Result<ObjectState, StoreError> {
        let objects = self.pool.objects.read().expect("pool lock poisoned");
        let object = objects.get(oid).ok_or(StoreError::NotFound)?;
        Ok(ObjectState {
            size: object.data.len() as u64,
            mtime: object.mtime.unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }

    async fn read(&self, oid: &str, offset: u64, len: usize) -> Result<Bytes, StoreError> {
        let fut = async {
            let objects = self.pool.objects.read().expect("pool lock poisoned");
            let object = objects.get(oid).ok_or(StoreError::NotFound)?;
            let size = object.data.len() as u64;
            if offset >= size {
                return Ok(Bytes::new());
            }
            let end = size.min(offset + len as u64) as usize;
            Ok(Bytes::copy_from_slice(&object.data[offset as usize..end]))
        };
        tokio::time::timeout(self.opts.osd_op_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    fn write_aio(&self, oid: &str, data: Bytes, offset: u64) -> Result<Completion, StoreError> {
        let (tx, completion) = Completion::channel();
        let pool = self.pool.clone();
        let oid = oid.to_string();
        tokio::spawn(async move {
            pool.write_at(&oid, &data, offset);
            let _ = tx.send(Ok(()));
        });
        Ok(completion)
    }

    async fn remove(&self, oid: &str) -> Result<(), StoreError> {
        let mut objects = self.pool.objects.write().expect("pool lock poisoned");
        objects.remove(oid).map(|_| ()).ok_or(StoreError::NotFound)
    }
}
