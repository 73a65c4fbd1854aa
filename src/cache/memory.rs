//! In-memory tier for decoded bitmaps.
//!
//! An LRU map from [`CacheKey`] to [`Bitmap`], bounded by the total decoded
//! size of its entries (row bytes × height). Inserting past the budget evicts
//! least-recently-used entries until the new entry fits.
//!
//! Insertion is idempotent: putting a key that is already cached is a no-op
//! that reports `false`, so concurrent loads of the same key never replace
//! the bitmap a slot may already be showing.

use lru::LruCache;
use tokio::sync::RwLock;
use tracing::trace;

use crate::decode::Bitmap;

use super::key::CacheKey;

/// Default memory budget when none is configured: 64MB
pub const DEFAULT_MEMORY_CAPACITY: usize = 64 * 1024 * 1024;

struct Inner {
    lru: LruCache<CacheKey, Bitmap>,
    size: usize,
}

/// Byte-bounded LRU cache of decoded bitmaps.
///
/// # Thread Safety
///
/// The LRU map and its size counter live behind one lock, so size
/// accounting can never drift from the entries actually held.
pub struct MemoryCache {
    inner: RwLock<Inner>,
    max_size: usize,
}

impl MemoryCache {
    /// Create a cache with the default budget.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    /// Create a cache bounded to `max_size` bytes of decoded pixels.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                lru: LruCache::unbounded(),
                size: 0,
            }),
            max_size,
        }
    }

    /// Get a bitmap, marking it recently used.
    pub async fn get(&self, key: &CacheKey) -> Option<Bitmap> {
        let mut inner = self.inner.write().await;
        inner.lru.get(key).cloned()
    }

    /// Check for a key without updating LRU order.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        let inner = self.inner.read().await;
        inner.lru.contains(key)
    }

    /// Insert a bitmap.
    ///
    /// Returns `false` without touching the cache when the key is already
    /// present, the bitmap is empty, or the bitmap alone exceeds the budget.
    pub async fn put(&self, key: CacheKey, bitmap: Bitmap) -> bool {
        if bitmap.is_empty() {
            return false;
        }

        let cost = bitmap.byte_count();
        if cost > self.max_size {
            trace!(cost, capacity = self.max_size, "Bitmap larger than memory budget");
            return false;
        }

        let mut inner = self.inner.write().await;
        if inner.lru.contains(&key) {
            return false;
        }

        // Make room before inserting so the new entry is never the victim
        while inner.size + cost > self.max_size {
            match inner.lru.pop_lru() {
                Some((_, evicted)) => {
                    inner.size = inner.size.saturating_sub(evicted.byte_count());
                }
                None => break,
            }
        }

        inner.lru.put(key, bitmap);
        inner.size += cost;
        true
    }

    /// Remove a bitmap, returning it if it was cached.
    pub async fn remove(&self, key: &CacheKey) -> Option<Bitmap> {
        let mut inner = self.inner.write().await;
        let removed = inner.lru.pop(key);
        if let Some(bitmap) = &removed {
            inner.size = inner.size.saturating_sub(bitmap.byte_count());
        }
        removed
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.lru.clear();
        inner.size = 0;
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.lru.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.lru.is_empty()
    }

    /// Current total decoded size in bytes.
    pub async fn size(&self) -> usize {
        self.inner.read().await.size
    }

    /// Budget in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
