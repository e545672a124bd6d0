//! Cooperatively-shared cache for small objects.
//!
//! Gateway nodes partition the chunk key-space; each node keeps a bounded
//! LRU of fixed-size aligned chunks. The peer membership is hot-reloadable
//! (SIGHUP) without dropping the cached contents. Fetching a chunk from the
//! owning peer is transport glue outside this crate; a miss here always
//! loads from the store and is accounted as a load.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use bytes::{Bytes, BytesMut};
use lru::LruCache;

use crate::store::{StoreError, Striper};

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct ChunkKey {
    pool: String,
    oid: String,
    index: u64,
}

struct ChunkCache {
    entries: LruCache<ChunkKey, Bytes>,
    bytes: u64,
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self {
            entries: LruCache::unbounded(),
            bytes: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub gets: AtomicU64,
    pub hits: AtomicU64,
    pub loads: AtomicU64,
    pub evictions: AtomicU64,
}

struct PeerSet {
    peers: Vec<String>,
    port: u16,
}

pub struct CachePool {
    name: String,
    self_addr: String,
    peer_set: RwLock<PeerSet>,
    chunk_size: usize,
    budget: u64,
    chunks: Mutex<ChunkCache>,
    stats: CacheStats,
}

impl CachePool {
    pub fn new(
        name: impl Into<String>,
        self_addr: impl Into<String>,
        peers: Vec<String>,
        port: u16,
        budget_bytes: u64,
        chunk_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            self_addr: self_addr.into(),
            peer_set: RwLock::new(PeerSet { peers, port }),
            chunk_size,
            budget: budget_bytes,
            chunks: Mutex::new(ChunkCache::default()),
            stats: CacheStats::default(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Swap the peer membership (SIGHUP reload). Cached chunks survive.
    pub fn set_peers(&self, peers: Vec<String>, port: u16) {
        let mut set = self.peer_set.write().expect("peer lock poisoned");
        set.peers = peers;
        set.port = port;
    }

    /// The peer responsible for a chunk under the current membership.
    fn owner_of(&self, key: &ChunkKey) -> String {
        let set = self.peer_set.read().expect("peer lock poisoned");
        if set.peers.is_empty() {
            return self.self_addr.clone();
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        set.peers[(hasher.finish() % set.peers.len() as u64) as usize].clone()
    }

    fn lookup(&self, key: &ChunkKey) -> Option<Bytes> {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        let mut cache = self.chunks.lock().expect("chunk lock poisoned");
        let hit = cache.entries.get(key).cloned();
        if hit.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    fn store(&self, key: ChunkKey, data: Bytes) {
        self.stats.loads.fetch_add(1, Ordering::Relaxed);
        let mut cache = self.chunks.lock().expect("chunk lock poisoned");
        if let Some(old) = cache.entries.put(key, data.clone()) {
            cache.bytes -= old.len() as u64;
        }
        cache.bytes += data.len() as u64;
        while cache.bytes > self.budget {
            match cache.entries.pop_lru() {
                Some((_, evicted)) => {
                    cache.bytes -= evicted.len() as u64;
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }

    /// Rendered on `/cachestats`.
    pub fn stats_text(&self) -> String {
        let set = self.peer_set.read().expect("peer lock poisoned");
        let cache = self.chunks.lock().expect("chunk lock poisoned");
        format!(
            "{{name:{} gets:{} hits:{} loads:{} evictions:{} chunks:{} bytes:{} peers:{:?} port:{}}}\n",
            self.name,
            self.stats.gets.load(Ordering::Relaxed),
            self.stats.hits.load(Ordering::Relaxed),
            self.stats.loads.load(Ordering::Relaxed),
            self.stats.evictions.load(Ordering::Relaxed),
            cache.entries.len(),
            cache.bytes,
            set.peers,
            set.port,
        )
    }
}

/// Serves arbitrary byte ranges of one object by reading fixed-size aligned
/// chunks through the cache and concatenating.
pub struct ChunkAlignedReader {
    cache: Arc<CachePool>,
    striper: Box<dyn Striper>,
    pool: String,
    oid: String,
    size: u64,
}

impl ChunkAlignedReader {
    pub fn new(
        cache: Arc<CachePool>,
        striper: Box<dyn Striper>,
        pool: impl Into<String>,
        oid: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            cache,
            striper,
            pool: pool.into(),
            oid: oid.into(),
            size,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read up to `len` bytes at `offset`, clipped to `[0, size)`.
    pub async fn read_at(&self, offset: u64, len: usize) -> Result<Bytes, StoreError> {
        if offset >= self.size || len == 0 {
            return Ok(Bytes::new());
        }
        let end = self.size.min(offset + len as u64);
        let chunk_size = self.cache.chunk_size as u64;

        let mut out = BytesMut::with_capacity((end - offset) as usize);
        let mut pos = offset;
        while pos < end {
            let index = pos / chunk_size;
            let chunk_off = index * chunk_size;
            let data = self.chunk(index).await?;
            let lo = (pos - chunk_off) as usize;
            let hi = data.len().min((end - chunk_off) as usize);
            if hi <= lo {
                break;
            }
            out.extend_from_slice(&data[lo..hi]);
            pos = chunk_off + hi as u64;
        }
        Ok(out.freeze())
    }

    /// One full aligned chunk (the last chunk of the object may be short).
    async fn chunk(&self, index: u64) -> Result<Bytes, StoreError> {
        let key = ChunkKey {
            pool: self.pool.clone(),
            oid: self.oid.clone(),
            index,
        };
        if let Some(data) = self.cache.lookup(&key) {
            return Ok(data);
        }
        tracing::trace!(
            "chunk miss {}/{}#{index}, owner {}",
            self.pool,
            self.oid,
            self.cache.owner_of(&key)
        );
        let chunk_off = index * self.cache.chunk_size as u64;
        let want = (self.cache.chunk_size as u64).min(self.size.saturating_sub(chunk_off));
        let data = self.striper.read(&self.oid, chunk_off, want as usize).await?;
        self.cache.store(key, data.clone());
        Ok(data)
    }
}
