// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory cache backend
//!
//! Reference implementation of the [`CacheStore`] port: a process-local map
//! with lazy TTL expiry and versioned keyspaces. Safe to share across
//! threads, which the lock protocol relies on in tests and embedded use.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::cache::{CacheEntry, CacheStore, DEFAULT_VERSION};

struct StoredEntry {
    entry: CacheEntry,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() > deadline)
            .unwrap_or(false)
    }
}

/// Process-local [`CacheStore`] backed by a hash map.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn full_key(key: &str, version: Option<u64>) -> String {
        format!("{}:{}", version.unwrap_or(DEFAULT_VERSION), key)
    }

    /// Number of live entries, expired ones included until touched.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop everything, all version namespaces included.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str, version: Option<u64>) -> Option<CacheEntry> {
        let full_key = Self::full_key(key, version);
        let mut entries = self.entries.write();
        match entries.get(&full_key) {
            Some(stored) if stored.is_expired() => {
                entries.remove(&full_key);
                None
            }
            Some(stored) => Some(stored.entry.clone()),
            None => None,
        }
    }

    fn set(&self, key: &str, entry: CacheEntry, ttl: Option<Duration>, version: Option<u64>) {
        let stored = StoredEntry {
            entry,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries
            .write()
            .insert(Self::full_key(key, version), stored);
    }

    fn delete(&self, key: &str, version: Option<u64>) {
        self.entries.write().remove(&Self::full_key(key, version));
    }

    fn get_many(&self, keys: &HashSet<String>, version: Option<u64>) -> HashMap<String, CacheEntry> {
        let mut found = HashMap::new();
        let mut entries = self.entries.write();
        for key in keys {
            let full_key = Self::full_key(key, version);
            match entries.get(&full_key) {
                Some(stored) if stored.is_expired() => {
                    entries.remove(&full_key);
                }
                Some(stored) => {
                    found.insert(key.clone(), stored.entry.clone());
                }
                None => {}
            }
        }
        found
    }

    fn set_many(
        &self,
        new_entries: HashMap<String, CacheEntry>,
        ttl: Option<Duration>,
        version: Option<u64>,
    ) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries.write();
        for (key, entry) in new_entries {
            entries.insert(Self::full_key(&key, version), StoredEntry { entry, expires_at });
        }
    }

    fn delete_many(&self, keys: &[String], version: Option<u64>) {
        let mut entries = self.entries.write();
        for key in keys {
            entries.remove(&Self::full_key(key, version));
        }
    }
}
