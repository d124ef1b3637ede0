//! # Cipher Cache
//!
//! Bounded LRU shared between request handlers. Values are handed out as
//! `Arc` so a lookup never holds the lock while the caller works.

use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Thread-safe bounded LRU of session ciphers.
pub struct CipherCache<K: Hash + Eq, V> {
    inner: Mutex<LruCache<K, Arc<V>>>,
}

impl<K: Hash + Eq, V> CipherCache<K, V> {
    /// Cache holding at most `capacity` entries (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up and mark as recently used.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.inner.lock().get(key).cloned()
    }

    /// Insert, evicting the least recently used entry if full.
    pub fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.inner.lock().put(key, Arc::clone(&value));
        value
    }

    /// Return the cached value, or build it without holding the lock.
    ///
    /// Two racing callers may both build; the later insert wins. Both
    /// values are equivalent, so either is safe to use.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        build: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = build()?;
        Ok(self.insert(key, value))
    }

    /// Drop one entry.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.inner.lock().pop(key)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
