use crate::mobile::Serial;
use crate::persistence::store::SaveStore;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Read cache in front of the save store. Verified record payloads are kept
/// hot so repeated restores (house co-owners, pet trains, staff queries) do
/// not re-read and re-digest the same file.
pub struct RecordCache {
    cache: LruCache<Serial, Arc<Vec<u8>>>,
    store: SaveStore,
    stats: CacheStats,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub loads: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

impl RecordCache {
    pub fn new(store: SaveStore, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            store,
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Fetch a record payload, loading from the store on a miss.
    pub fn get_record(&mut self, serial: Serial) -> Result<Arc<Vec<u8>>, String> {
        if let Some(payload) = self.cache.get(&serial) {
            self.stats.hits += 1;
            return Ok(Arc::clone(payload));
        }
        self.stats.misses += 1;
        let payload = Arc::new(self.store.load_raw(serial)?);
        self.stats.loads += 1;
        if self.cache.len() == self.cache.cap().get() {
            self.stats.evictions += 1;
        }
        self.cache.put(serial, Arc::clone(&payload));
        Ok(payload)
    }

    /// Write through: persist the payload and refresh the cached copy.
    pub fn put_record(&mut self, serial: Serial, payload: Vec<u8>) -> Result<(), String> {
        self.store.save_raw(serial, &payload)?;
        if self.cache.len() == self.cache.cap().get() && !self.cache.contains(&serial) {
            self.stats.evictions += 1;
        }
        self.cache.put(serial, Arc::new(payload));
        Ok(())
    }

    /// Drop a cached entry; the next read goes back to disk.
    pub fn invalidate(&mut self, serial: Serial) -> bool {
        self.cache.pop(&serial).is_some()
    }

    pub fn store(&self) -> &SaveStore {
        &self.store
    }
}
