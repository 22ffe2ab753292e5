//! Caching layer for decoded blocks
//!
//! UTXO resolution replays the chain from head to genesis on every query, so
//! recently read blocks are kept decoded in an LRU cache. Blocks are
//! content-addressed and never mutated, which means an entry can never go
//! stale; the cache only ever needs eviction, not invalidation.

use crate::blockchain::Block;
use crate::crypto::Sha256Hash;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_BLOCK_CACHE_SIZE: usize = 256;

pub struct BlockCache {
    inner: Mutex<LruCache<Sha256Hash, Block>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Hit/miss counters, mostly useful in logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: Default::default(),
            misses: Default::default(),
        }
    }

    pub fn get(&self, hash: &Sha256Hash) -> Option<Block> {
        let found = self.inner.lock().get(hash).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn insert(&self, block: Block) {
        self.inner.lock().put(block.hash, block);
    }

    /// Drop `hash`, for blocks deleted from the store.
    pub fn remove(&self, hash: &Sha256Hash) -> Option<Block> {
        self.inner.lock().pop(hash)
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_CACHE_SIZE)
    }
}
