//! Test utilities for TagCache integration tests
//!
//! Provides an isolated fixture (fresh in-memory store + tagged cache) and a
//! call-counting store wrapper for batching assertions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tagcache::{CacheEntry, CacheSettings, CacheStore, MemoryStore, TaggedCache};

/// Fresh store plus a cache instance bound to it.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub cache: TaggedCache,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_settings(CacheSettings::default())
    }

    pub fn with_settings(settings: CacheSettings) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = Arc::new(MemoryStore::new());
        let cache = TaggedCache::new(Arc::clone(&store) as Arc<dyn CacheStore>, settings);
        Self { store, cache }
    }

    /// A second cache instance over the same store, e.g. for another thread's
    /// session.
    pub fn sibling_cache(store: &Arc<MemoryStore>, settings: CacheSettings) -> TaggedCache {
        TaggedCache::new(Arc::clone(store) as Arc<dyn CacheStore>, settings)
    }
}

/// Store wrapper recording the key set of every `get_many`.
pub struct CountingStore {
    inner: MemoryStore,
    calls: Mutex<Vec<HashSet<String>>>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn get_many_calls(&self) -> Vec<HashSet<String>> {
        self.calls.lock().clone()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }
}

impl CacheStore for CountingStore {
    fn get(&self, key: &str, version: Option<u64>) -> Option<CacheEntry> {
        self.inner.get(key, version)
    }

    fn set(&self, key: &str, entry: CacheEntry, ttl: Option<Duration>, version: Option<u64>) {
        self.inner.set(key, entry, ttl, version)
    }

    fn delete(&self, key: &str, version: Option<u64>) {
        self.inner.delete(key, version)
    }

    fn get_many(&self, keys: &HashSet<String>, version: Option<u64>) -> HashMap<String, CacheEntry> {
        self.calls.lock().push(keys.clone());
        self.inner.get_many(keys, version)
    }

    fn set_many(
        &self,
        entries: HashMap<String, CacheEntry>,
        ttl: Option<Duration>,
        version: Option<u64>,
    ) {
        self.inner.set_many(entries, ttl, version)
    }

    fn delete_many(&self, keys: &[String], version: Option<u64>) {
        self.inner.delete_many(keys, version)
    }
}
