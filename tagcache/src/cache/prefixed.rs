// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Key-policy store adapter
//!
//! Wraps any [`CacheStore`] with a key prefix and a default version
//! namespace, the way multi-tenant deployments carve one shared memcached
//! into logical caches. Keys that would misbehave on memcached-like backends
//! (too long, control characters) are flagged at write time.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::cache::{CacheEntry, CacheStore};

/// Memcached rejects keys longer than this.
pub const MAX_PORTABLE_KEY_LENGTH: usize = 250;

/// [`CacheStore`] decorator applying a key prefix and a default version.
///
/// The full key layout is `<prefix>:<version>:<key>`; it must stay stable for
/// the lifetime of the process, like the tag-key namespace itself.
pub struct PrefixedStore<S> {
    inner: S,
    prefix: String,
    default_version: u64,
}

impl<S: CacheStore> PrefixedStore<S> {
    pub fn new(inner: S, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
            default_version: crate::cache::DEFAULT_VERSION,
        }
    }

    pub fn with_default_version(mut self, version: u64) -> Self {
        self.default_version = version;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn full_key(&self, key: &str, version: Option<u64>) -> String {
        format!(
            "{}:{}:{}",
            self.prefix,
            version.unwrap_or(self.default_version),
            key
        )
    }

    /// Flag keys that are not portable to memcached-like backends.
    fn validate_key(&self, key: &str) {
        if key.len() > MAX_PORTABLE_KEY_LENGTH {
            log::warn!(
                "cache key {:?} is longer than {} bytes and will fail on memcached",
                key,
                MAX_PORTABLE_KEY_LENGTH
            );
        }
        if key
            .chars()
            .any(|c| (c as u32) < 33 || (c as u32) == 127)
        {
            log::warn!(
                "cache key {:?} contains whitespace or control characters and will fail on memcached",
                key
            );
        }
    }
}

impl<S: CacheStore> CacheStore for PrefixedStore<S> {
    fn get(&self, key: &str, version: Option<u64>) -> Option<CacheEntry> {
        self.inner.get(&self.full_key(key, version), None)
    }

    fn set(&self, key: &str, entry: CacheEntry, ttl: Option<Duration>, version: Option<u64>) {
        let full_key = self.full_key(key, version);
        self.validate_key(&full_key);
        self.inner.set(&full_key, entry, ttl, None)
    }

    fn delete(&self, key: &str, version: Option<u64>) {
        self.inner.delete(&self.full_key(key, version), None)
    }

    fn get_many(&self, keys: &HashSet<String>, version: Option<u64>) -> HashMap<String, CacheEntry> {
        let full_to_plain: HashMap<String, String> = keys
            .iter()
            .map(|key| (self.full_key(key, version), key.clone()))
            .collect();
        let full_keys: HashSet<String> = full_to_plain.keys().cloned().collect();
        self.inner
            .get_many(&full_keys, None)
            .into_iter()
            .filter_map(|(full_key, entry)| {
                full_to_plain
                    .get(&full_key)
                    .map(|plain| (plain.clone(), entry))
            })
            .collect()
    }

    fn set_many(
        &self,
        entries: HashMap<String, CacheEntry>,
        ttl: Option<Duration>,
        version: Option<u64>,
    ) {
        let prefixed: HashMap<String, CacheEntry> = entries
            .into_iter()
            .map(|(key, entry)| {
                let full_key = self.full_key(&key, version);
                self.validate_key(&full_key);
                (full_key, entry)
            })
            .collect();
        self.inner.set_many(prefixed, ttl, None)
    }

    fn delete_many(&self, keys: &[String], version: Option<u64>) {
        let prefixed: Vec<String> = keys
            .iter()
            .map(|key| self.full_key(key, version))
            .collect();
        self.inner.delete_many(&prefixed, None)
    }
}
