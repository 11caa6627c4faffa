// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The tag-set dependency
//!
//! An artifact cached under a `TagsDependency` snapshots the current version
//! of every tag at write time. Reads compare the snapshot against the live
//! versions; invalidation deletes the version records so the next writer
//! mints fresh ones.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheEntry, CacheStore};
use crate::defer::{Deferred, Resolved};
use crate::deps::state::{effective_state, TagState};
use crate::error::{DependencyInvalid, DependencyLocked};
use crate::tagging::{self, Tag, TagVersion, TAG_STATE_TTL, TAG_VERSION_TTL};
use crate::txn::TransactionView;

/// Dependency on a set of named tags, with the versions captured at the last
/// successful evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagsDependency {
    tags: HashSet<Tag>,
    tag_versions: HashMap<Tag, TagVersion>,
}

impl TagsDependency {
    pub fn new<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            tag_versions: HashMap::new(),
        }
    }

    pub fn tags(&self) -> &HashSet<Tag> {
        &self.tags
    }

    /// The tag versions captured by the last evaluation.
    pub fn captured_versions(&self) -> &HashMap<Tag, TagVersion> {
        &self.tag_versions
    }

    /// Pre-write check: refuse when any tag is held by a concurrent session,
    /// otherwise capture the current versions, minting records for tags seen
    /// for the first time.
    pub(crate) fn evaluate(
        &mut self,
        store: &Arc<dyn CacheStore>,
        txn: &TransactionView,
        version: Option<u64>,
    ) -> Result<(), DependencyLocked> {
        let mut deferred = self.tag_versions_deferred(store, version);
        deferred += self.locked_tags_deferred(store, txn, version);
        // Both results are pulled before any error is raised, so sibling
        // reads piggy-backed on the same batch are not lost.
        let locked = deferred
            .get()
            .expect("tag version reads do not fail")
            .into_tag_set();
        let mut versions = deferred
            .get()
            .expect("tag version reads do not fail")
            .into_version_map();
        if !locked.is_empty() {
            return Err(DependencyLocked::Tags { tags: locked });
        }

        let nonexistent: HashSet<Tag> = self
            .tags
            .iter()
            .filter(|tag| !versions.contains_key(*tag))
            .cloned()
            .collect();
        versions.extend(self.mint_versions(store, &nonexistent, version));
        self.tag_versions = versions;
        Ok(())
    }

    /// Read-time check: a deferred whose single callback compares the
    /// captured versions against the live ones.
    pub(crate) fn validate(&self, store: &Arc<dyn CacheStore>, version: Option<u64>) -> Deferred {
        let mut deferred = self.tag_versions_deferred(store, version);
        let captured = self.tag_versions.clone();
        deferred.push(HashSet::new(), move |ctx, _batch| {
            let actual = ctx.get()?.into_version_map();
            let stale: HashSet<Tag> = captured
                .iter()
                .filter(|(tag, captured_version)| actual.get(*tag) != Some(*captured_version))
                .map(|(tag, _)| tag.clone())
                .collect();
            if stale.is_empty() {
                Ok(Resolved::Nothing)
            } else {
                Err(DependencyInvalid::Tags { tags: stale }.into())
            }
        });
        deferred
    }

    /// Delete the version records; the next observation mints new versions.
    pub(crate) fn invalidate(&self, store: &Arc<dyn CacheStore>, version: Option<u64>) {
        let keys: Vec<String> = self.tags.iter().map(|tag| tagging::tag_key(tag)).collect();
        store.delete_many(&keys, version);
    }

    /// Write an acquired record for every tag, stamped with the transaction's
    /// start time.
    pub(crate) fn acquire(
        &self,
        store: &Arc<dyn CacheStore>,
        txn: &TransactionView,
        version: Option<u64>,
    ) {
        let state = TagState::acquired(txn);
        let entries: HashMap<String, CacheEntry> = self
            .tags
            .iter()
            .map(|tag| {
                (
                    tagging::acquired_key(tag),
                    CacheEntry::TagState(state.clone()),
                )
            })
            .collect();
        store.set_many(entries, Some(TAG_STATE_TTL), version);
    }

    /// Write a released record for every tag. Its TTL strictly exceeds the
    /// acquired record's so the release stays observable after the acquire
    /// expires.
    pub(crate) fn release(
        &self,
        store: &Arc<dyn CacheStore>,
        txn: &TransactionView,
        delay: u64,
        version: Option<u64>,
    ) {
        let state = TagState::released(txn, delay);
        let ttl = TAG_STATE_TTL + std::time::Duration::from_secs(delay.max(1));
        let entries: HashMap<String, CacheEntry> = self
            .tags
            .iter()
            .map(|tag| {
                (
                    tagging::released_key(tag),
                    CacheEntry::TagState(state.clone()),
                )
            })
            .collect();
        store.set_many(entries, Some(ttl), version);
    }

    /// Union another tag dependency into this one.
    pub(crate) fn absorb(&mut self, other: &TagsDependency) {
        self.tags.extend(other.tags.iter().cloned());
        self.tag_versions
            .extend(other.tag_versions.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    fn tag_versions_deferred(&self, store: &Arc<dyn CacheStore>, version: Option<u64>) -> Deferred {
        let key_to_tag: HashMap<String, Tag> = self
            .tags
            .iter()
            .map(|tag| (tagging::tag_key(tag), tag.clone()))
            .collect();
        let keys: HashSet<String> = key_to_tag.keys().cloned().collect();
        let mut deferred = Deferred::get_many(Arc::clone(store), version);
        deferred.push(keys, move |_ctx, batch| {
            let mut versions = HashMap::new();
            for (key, entry) in batch {
                if let CacheEntry::TagVersion(found) = entry {
                    if let Some(tag) = key_to_tag.get(key) {
                        versions.insert(tag.clone(), found.clone());
                    }
                }
            }
            Ok(Resolved::VersionMap(versions))
        });
        deferred
    }

    fn locked_tags_deferred(
        &self,
        store: &Arc<dyn CacheStore>,
        txn: &TransactionView,
        version: Option<u64>,
    ) -> Deferred {
        let acquired_keys: HashMap<String, Tag> = self
            .tags
            .iter()
            .map(|tag| (tagging::acquired_key(tag), tag.clone()))
            .collect();
        let released_keys: HashMap<String, Tag> = self
            .tags
            .iter()
            .map(|tag| (tagging::released_key(tag), tag.clone()))
            .collect();
        let keys: HashSet<String> = acquired_keys
            .keys()
            .chain(released_keys.keys())
            .cloned()
            .collect();

        let tags = self.tags.clone();
        let txn = txn.clone();
        let mut deferred = Deferred::get_many(Arc::clone(store), version);
        deferred.push(keys, move |_ctx, batch| {
            let mut acquired_states: HashMap<&Tag, &TagState> = HashMap::new();
            let mut released_states: HashMap<&Tag, &TagState> = HashMap::new();
            for (key, entry) in batch {
                if let CacheEntry::TagState(state) = entry {
                    if let Some(tag) = acquired_keys.get(key) {
                        acquired_states.insert(tag, state);
                    } else if let Some(tag) = released_keys.get(key) {
                        released_states.insert(tag, state);
                    }
                }
            }

            let mut locked = HashSet::new();
            for tag in &tags {
                let state = effective_state(
                    acquired_states.get(tag).copied(),
                    released_states.get(tag).copied(),
                );
                if let Some(state) = state {
                    if state.is_locked(&txn) {
                        locked.insert(tag.clone());
                    }
                }
            }
            Ok(Resolved::TagSet(locked))
        });
        deferred
    }

    fn mint_versions(
        &self,
        store: &Arc<dyn CacheStore>,
        tags: &HashSet<Tag>,
        version: Option<u64>,
    ) -> HashMap<Tag, TagVersion> {
        if tags.is_empty() {
            return HashMap::new();
        }
        let minted: HashMap<Tag, TagVersion> = tags
            .iter()
            .map(|tag| (tag.clone(), tagging::generate_tag_version()))
            .collect();
        let entries: HashMap<String, CacheEntry> = minted
            .iter()
            .map(|(tag, tag_version)| {
                (
                    tagging::tag_key(tag),
                    CacheEntry::TagVersion(tag_version.clone()),
                )
            })
            .collect();
        store.set_many(entries, Some(TAG_VERSION_TTL), version);
        minted
    }
}
