// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache port and the tagged cache built on top of it
//!
//! This module provides:
//! - The `CacheStore` contract the engine consumes (any key/value cache with
//!   TTLs and an integer version namespace)
//! - The typed value model stored under artifact and tag keys
//! - An in-memory reference backend and a key-prefixing adapter
//! - The public `TaggedCache` wrapper and its per-thread instance registry

pub mod config;
pub mod memory;
pub mod prefixed;
pub mod registry;
pub mod wrapper;

pub use config::CacheSettings;
pub use memory::MemoryStore;
pub use prefixed::PrefixedStore;
pub use registry::{cache_instance, close_instances};
pub use wrapper::TaggedCache;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deps::{Dependency, TagState};
use crate::tagging::TagVersion;

/// Default version namespace, matching the common cache-client convention.
pub const DEFAULT_VERSION: u64 = 1;

/// A value stored in the underlying cache.
///
/// Artifacts written by this library are `Packed` with their dependency;
/// anything else unpacks to a raw value with a dummy dependency and passes
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheEntry {
    /// Pre-existing application payload not written by this library.
    Raw(serde_json::Value),
    /// Artifact payload packed together with its dependency.
    Packed {
        value: serde_json::Value,
        dependency: Dependency,
    },
    /// Current version record of a tag.
    TagVersion(TagVersion),
    /// Lock-accounting record of a tag.
    TagState(TagState),
}

impl CacheEntry {
    /// Split an entry into its application value and dependency.
    pub fn unpack(self) -> (serde_json::Value, Dependency) {
        match self {
            CacheEntry::Packed { value, dependency } => (value, dependency),
            CacheEntry::Raw(value) => (value, Dependency::Dummy),
            other => (
                serde_json::to_value(&other).unwrap_or(serde_json::Value::Null),
                Dependency::Dummy,
            ),
        }
    }
}

/// Contract of the underlying key/value cache.
///
/// A `version` names an orthogonal keyspace; all tag and artifact accesses of
/// one logical cache carry the same version. Operations fail silently: a
/// missing key is absent from `get_many`'s result and `get` returns `None`.
/// No durability is assumed.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str, version: Option<u64>) -> Option<CacheEntry>;

    fn set(&self, key: &str, entry: CacheEntry, ttl: Option<Duration>, version: Option<u64>);

    fn delete(&self, key: &str, version: Option<u64>);

    /// Fetch a bunch of keys at once; missing keys are absent from the result.
    fn get_many(&self, keys: &HashSet<String>, version: Option<u64>) -> HashMap<String, CacheEntry>;

    fn set_many(
        &self,
        entries: HashMap<String, CacheEntry>,
        ttl: Option<Duration>,
        version: Option<u64>,
    );

    fn delete_many(&self, keys: &[String], version: Option<u64>);
}

/// Shared handles to a store are stores themselves.
impl<S: CacheStore + ?Sized> CacheStore for std::sync::Arc<S> {
    fn get(&self, key: &str, version: Option<u64>) -> Option<CacheEntry> {
        (**self).get(key, version)
    }

    fn set(&self, key: &str, entry: CacheEntry, ttl: Option<Duration>, version: Option<u64>) {
        (**self).set(key, entry, ttl, version)
    }

    fn delete(&self, key: &str, version: Option<u64>) {
        (**self).delete(key, version)
    }

    fn get_many(&self, keys: &HashSet<String>, version: Option<u64>) -> HashMap<String, CacheEntry> {
        (**self).get_many(keys, version)
    }

    fn set_many(
        &self,
        entries: HashMap<String, CacheEntry>,
        ttl: Option<Duration>,
        version: Option<u64>,
    ) {
        (**self).set_many(entries, ttl, version)
    }

    fn delete_many(&self, keys: &[String], version: Option<u64>) {
        (**self).delete_many(keys, version)
    }
}
