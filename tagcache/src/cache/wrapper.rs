// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The tagged cache wrapper
//!
//! `TaggedCache` is the public surface of the engine. Writes pack the value
//! with its combined dependency (explicit tags plus everything accumulated by
//! descendant fragments) after the current transaction agrees nothing is
//! locked; reads unpack, validate against the live tag versions and translate
//! a stale dependency into a miss.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::cache::{CacheEntry, CacheSettings, CacheStore};
use crate::defer::Deferred;
use crate::deps::{CompositeDependency, Dependency, TagsDependency};
use crate::relations::{RelationManager, ThreadBoundRelationManager};
use crate::tagging::Tag;
use crate::txn::{
    DependencyLock, ThreadBoundTransactionManager, TransactionManager,
};

/// Tag-aware cache over an arbitrary [`CacheStore`].
///
/// One instance is owned by one thread (the relation and transaction stacks
/// are thread-affine); the underlying store may be shared freely.
pub struct TaggedCache {
    store: Arc<dyn CacheStore>,
    relations: ThreadBoundRelationManager,
    transaction: ThreadBoundTransactionManager,
    ignore_descendants: Cell<bool>,
}

impl TaggedCache {
    pub fn new(store: Arc<dyn CacheStore>, settings: CacheSettings) -> Self {
        let lock = Arc::new(DependencyLock::new(
            Arc::clone(&store),
            settings.isolation,
            settings.delay,
        ));
        Self {
            store,
            relations: ThreadBoundRelationManager::new(RelationManager::new()),
            transaction: ThreadBoundTransactionManager::new(TransactionManager::new(lock)),
            ignore_descendants: Cell::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// The per-thread transaction stack of this instance.
    pub fn transaction(&self) -> &ThreadBoundTransactionManager {
        &self.transaction
    }

    /// When set, reads no longer register relation nodes, so descendant tags
    /// stop propagating into enclosing fragments.
    pub fn set_ignore_descendants(&self, ignore: bool) {
        self.ignore_descendants.set(ignore);
    }

    /// Fetch `key`, validating its dependency. A missing key or a stale
    /// dependency is `None`.
    pub fn get(&self, key: &str, version: Option<u64>) -> Option<Value> {
        self.get_inner(key, version, false)
    }

    /// Like [`TaggedCache::get`], without registering a relation node for the
    /// key.
    pub fn get_abort(&self, key: &str, version: Option<u64>) -> Option<Value> {
        self.get_inner(key, version, true)
    }

    /// Fetch `key`, falling back to `default` on a miss.
    pub fn get_or_default(&self, key: &str, default: Value, version: Option<u64>) -> Value {
        self.get(key, version).unwrap_or(default)
    }

    fn get_inner(&self, key: &str, version: Option<u64>, abort: bool) -> Option<Value> {
        if !abort && !self.ignore_descendants.get() {
            self.begin(key);
        }
        let data = self.store.get(key, version)?;
        let (value, dependency) = data.unpack();

        let deferred = dependency.validate(&self.store, version);
        match deferred.get() {
            Ok(_) => {}
            Err(invalid) => {
                // Do not finish: the relation node survives so the producer
                // about to rebuild this key inherits its descendants.
                log::debug!("cache key {:?} is stale: {}", key, invalid);
                return None;
            }
        }

        self.finish(key, &dependency, version);
        Some(value)
    }

    /// Fetch several keys at once. Stale keys are dropped from the result;
    /// all dependency validations share batched tag reads.
    pub fn get_many(&self, keys: &[String], version: Option<u64>) -> HashMap<String, Value> {
        self.get_many_inner(keys, version, false)
    }

    /// Like [`TaggedCache::get_many`], without registering relation nodes.
    pub fn get_many_abort(&self, keys: &[String], version: Option<u64>) -> HashMap<String, Value> {
        self.get_many_inner(keys, version, true)
    }

    fn get_many_inner(
        &self,
        keys: &[String],
        version: Option<u64>,
        abort: bool,
    ) -> HashMap<String, Value> {
        if !abort && !self.ignore_descendants.get() {
            // Every fetched key becomes a sibling under the node that was
            // current before the call, not under each other.
            let saved = self.relations.current();
            for key in keys {
                self.begin(key);
                self.relations.set_current_node(saved.clone());
            }
        }

        let key_set: HashSet<String> = keys.iter().cloned().collect();
        let fetched = self.store.get_many(&key_set, version);

        let mut values = HashMap::new();
        let mut dependencies: Vec<(String, Dependency)> = Vec::new();
        for key in keys {
            if let Some(entry) = fetched.get(key) {
                let (value, dependency) = entry.clone().unpack();
                values.insert(key.clone(), value);
                dependencies.push((key.clone(), dependency));
            }
        }

        if !dependencies.is_empty() {
            let mut merged: Option<Deferred> = None;
            for (_, dependency) in &dependencies {
                let deferred = dependency.validate(&self.store, version);
                match merged.as_mut() {
                    Some(chain) => *chain += deferred,
                    None => merged = Some(deferred),
                }
            }
            let chain = merged.expect("at least one dependency was queued");
            // One validation outcome per key, in reverse insertion order.
            for (key, _) in dependencies.iter().rev() {
                if let Err(invalid) = chain.get() {
                    log::debug!("dropping stale key {:?} from get_many: {}", key, invalid);
                    values.remove(key);
                }
            }
        }

        for (key, dependency) in &dependencies {
            if values.contains_key(key) {
                self.finish(key, dependency, version);
            }
        }
        values
    }

    /// Cache `value` under `key` with an optional dependency.
    ///
    /// The stored dependency combines the explicit one with everything
    /// descendant fragments accumulated on the key's relation node. When a
    /// concurrent transaction holds one of the tags the write is dropped
    /// silently: the key simply is not cached this round.
    pub fn set(
        &self,
        key: &str,
        value: Value,
        dependency: Option<Dependency>,
        ttl: Option<Duration>,
        version: Option<u64>,
    ) {
        let explicit = dependency.unwrap_or(Dependency::Dummy);
        let mut combined = CompositeDependency::default();
        combined.extend(&explicit);
        combined.extend(&self.relations.get_dependency(key, version));
        let mut combined = Dependency::Composite(combined);

        match self.transaction.evaluate(&mut combined, version) {
            Ok(()) => {
                self.store.set(
                    key,
                    CacheEntry::Packed {
                        value,
                        dependency: combined,
                    },
                    ttl,
                    version,
                );
            }
            Err(locked) => {
                // Publishing now could race the concurrent invalidation, so
                // the write is skipped. If the tags get invalidated again in
                // the meantime that is fine too: nobody can read this entry.
                log::debug!("skipping cache write for {:?}: {}", key, locked);
            }
        }

        // Surface only the explicit tags to the enclosing fragment; the
        // descendants' tags reached it when their own keys finished.
        self.finish(key, &explicit, version);
    }

    /// Cache `value` under `key` with a plain set of tags.
    pub fn set_tagged<I, T>(
        &self,
        key: &str,
        value: Value,
        tags: I,
        ttl: Option<Duration>,
        version: Option<u64>,
    ) where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        let tags: HashSet<Tag> = tags.into_iter().map(Into::into).collect();
        let dependency = if tags.is_empty() {
            Dependency::Dummy
        } else {
            Dependency::Tags(TagsDependency::new(tags))
        };
        self.set(key, value, Some(dependency), ttl, version);
    }

    /// Fetch `key` or produce, cache and return a fresh value.
    pub fn get_or_set<F>(
        &self,
        key: &str,
        dependency: Option<Dependency>,
        ttl: Option<Duration>,
        version: Option<u64>,
        producer: F,
    ) -> Value
    where
        F: FnOnce() -> Value,
    {
        if let Some(value) = self.get(key, version) {
            return value;
        }
        let value = producer();
        self.set(key, value.clone(), dependency, ttl, version);
        value
    }

    /// Invalidate a dependency: record it on the current transaction (which
    /// acquires its lock state and schedules the release at finish), then
    /// bump the tag versions immediately.
    pub fn invalidate_dependency(&self, dependency: &Dependency, version: Option<u64>) {
        self.transaction.add_dependency(dependency, version);
        dependency.invalidate(&self.store, version);
    }

    /// Invalidate a plain set of tags.
    pub fn invalidate_tags<I, T>(&self, tags: I, version: Option<u64>)
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        let tags: HashSet<Tag> = tags.into_iter().map(Into::into).collect();
        let dependency = if tags.is_empty() {
            Dependency::Dummy
        } else {
            Dependency::Tags(TagsDependency::new(tags))
        };
        self.invalidate_dependency(&dependency, version);
    }

    /// Open a relation frame: `key` becomes the current in-progress fragment.
    pub fn begin(&self, key: &str) {
        self.relations.set_current(key);
    }

    /// Discard the relation frame for `key` without surfacing anything.
    pub fn abort(&self, key: &str) {
        self.relations.pop(key);
    }

    /// Close the relation frame for `key`, pushing `dependency` into the
    /// enclosing fragment.
    pub fn finish(&self, key: &str, dependency: &Dependency, version: Option<u64>) {
        if let Some(node) = self.relations.pop(key) {
            node.borrow_mut().add_dependency(dependency, version);
        }
    }

    /// Drain the transaction stack and drop all relation tracking.
    pub fn close(&self) {
        self.transaction.flush();
        self.relations.clear();
    }
}
