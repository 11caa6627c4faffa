// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Dependency algebra
//!
//! A [`Dependency`] is a reified predicate over the cache's tag state with a
//! lifecycle: *evaluate* before a write (may be locked), *validate* after a
//! read (may be invalid), *invalidate* to bump versions, *acquire*/*release*
//! for lock accounting. Variants are dispatched by explicit `match`;
//! [`Dependency::extend`] runs chain-of-responsibility over composite
//! delegates.

pub mod state;
pub mod tags;

pub use state::{effective_state, TagState};
pub use tags::TagsDependency;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::defer::{Deferred, Resolved};
use crate::error::{DependencyError, DependencyInvalid, DependencyLocked};
use crate::tagging::Tag;
use crate::txn::TransactionView;

/// A cache dependency: tags, an ordered aggregate of dependencies, or the
/// identity element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dependency {
    Tags(TagsDependency),
    Composite(CompositeDependency),
    /// Identity element: every operation is a no-op and validation always
    /// succeeds. Raw payloads unpack to this.
    Dummy,
}

impl Dependency {
    /// Convenience constructor for a tag-set dependency.
    pub fn tags<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        Dependency::Tags(TagsDependency::new(tags))
    }

    /// Pre-write check; on success tag dependencies capture current versions.
    pub fn evaluate(
        &mut self,
        store: &Arc<dyn CacheStore>,
        txn: &TransactionView,
        version: Option<u64>,
    ) -> Result<(), DependencyLocked> {
        match self {
            Dependency::Tags(tags) => tags.evaluate(store, txn, version),
            Dependency::Composite(composite) => composite.evaluate(store, txn, version),
            Dependency::Dummy => Ok(()),
        }
    }

    /// Read-time check, returned as a deferred so sibling validations batch
    /// their cache reads.
    pub fn validate(&self, store: &Arc<dyn CacheStore>, version: Option<u64>) -> Deferred {
        match self {
            Dependency::Tags(tags) => tags.validate(store, version),
            Dependency::Composite(composite) => composite.validate(store, version),
            Dependency::Dummy => {
                let mut deferred = Deferred::noop();
                deferred.push(HashSet::new(), |_ctx, _batch| Ok(Resolved::Nothing));
                deferred
            }
        }
    }

    /// Bump every referenced tag by deleting its version record.
    pub fn invalidate(&self, store: &Arc<dyn CacheStore>, version: Option<u64>) {
        match self {
            Dependency::Tags(tags) => tags.invalidate(store, version),
            Dependency::Composite(composite) => composite.invalidate(store, version),
            Dependency::Dummy => {}
        }
    }

    /// Write lock-state records marking the tags as taken by `txn`.
    pub fn acquire(
        &self,
        store: &Arc<dyn CacheStore>,
        txn: &TransactionView,
        version: Option<u64>,
    ) {
        match self {
            Dependency::Tags(tags) => tags.acquire(store, txn, version),
            Dependency::Composite(composite) => composite.acquire(store, txn, version),
            Dependency::Dummy => {}
        }
    }

    /// Write lock-state records marking the tags as released by `txn`, with a
    /// replication-delay window.
    pub fn release(
        &self,
        store: &Arc<dyn CacheStore>,
        txn: &TransactionView,
        delay: u64,
        version: Option<u64>,
    ) {
        match self {
            Dependency::Tags(tags) => tags.release(store, txn, delay, version),
            Dependency::Composite(composite) => composite.release(store, txn, delay, version),
            Dependency::Dummy => {}
        }
    }

    /// Try to absorb `other` into this dependency. Composites always accept;
    /// tag sets union with other tag sets; dummies absorb only dummies.
    pub fn extend(&mut self, other: &Dependency) -> bool {
        match (self, other) {
            (Dependency::Composite(composite), other) => {
                composite.extend(other);
                true
            }
            (Dependency::Tags(tags), Dependency::Tags(other)) => {
                tags.absorb(other);
                true
            }
            (Dependency::Dummy, Dependency::Dummy) => true,
            _ => false,
        }
    }
}

/// Ordered aggregate of dependencies.
///
/// Evaluation and validation run every delegate and collect their errors into
/// one composite error, never aborting the walk early; invalidation and lock
/// accounting fan out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeDependency {
    delegates: Vec<Dependency>,
}

impl CompositeDependency {
    pub fn new(delegates: Vec<Dependency>) -> Self {
        Self { delegates }
    }

    pub fn delegates(&self) -> &[Dependency] {
        &self.delegates
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }

    pub(crate) fn evaluate(
        &mut self,
        store: &Arc<dyn CacheStore>,
        txn: &TransactionView,
        version: Option<u64>,
    ) -> Result<(), DependencyLocked> {
        let mut children = Vec::new();
        for delegate in &mut self.delegates {
            if let Err(locked) = delegate.evaluate(store, txn, version) {
                children.push(locked);
            }
        }
        if children.is_empty() {
            Ok(())
        } else {
            Err(DependencyLocked::Composite { children })
        }
    }

    pub(crate) fn validate(&self, store: &Arc<dyn CacheStore>, version: Option<u64>) -> Deferred {
        let mut delegates = self.delegates.iter();
        let mut deferred = match delegates.next() {
            Some(first) => {
                let mut deferred = first.validate(store, version);
                for delegate in delegates {
                    deferred += delegate.validate(store, version);
                }
                deferred
            }
            None => Deferred::noop(),
        };
        deferred += Deferred::noop();

        // Terminal callback: drain one result per delegate, then aggregate.
        let expected = self.delegates.len();
        deferred.push(HashSet::new(), move |ctx, _batch| {
            let mut children = Vec::new();
            for _ in 0..expected {
                match ctx.get() {
                    Ok(_) => {}
                    Err(DependencyError::Invalid(invalid)) => children.push(invalid),
                    Err(other) => return Err(other),
                }
            }
            if children.is_empty() {
                Ok(Resolved::Nothing)
            } else {
                Err(DependencyInvalid::Composite { children }.into())
            }
        });
        deferred
    }

    pub(crate) fn invalidate(&self, store: &Arc<dyn CacheStore>, version: Option<u64>) {
        for delegate in &self.delegates {
            delegate.invalidate(store, version);
        }
    }

    pub(crate) fn acquire(
        &self,
        store: &Arc<dyn CacheStore>,
        txn: &TransactionView,
        version: Option<u64>,
    ) {
        for delegate in &self.delegates {
            delegate.acquire(store, txn, version);
        }
    }

    pub(crate) fn release(
        &self,
        store: &Arc<dyn CacheStore>,
        txn: &TransactionView,
        delay: u64,
        version: Option<u64>,
    ) {
        for delegate in &self.delegates {
            delegate.release(store, txn, delay, version);
        }
    }

    /// Absorb `other`: nested composites are flattened; anything else is
    /// offered to each delegate in turn and appended as a copy when none
    /// accepts it.
    pub(crate) fn extend(&mut self, other: &Dependency) {
        match other {
            Dependency::Composite(other) => {
                for delegate in &other.delegates {
                    self.extend(delegate);
                }
            }
            other => {
                for delegate in &mut self.delegates {
                    if delegate.extend(other) {
                        return;
                    }
                }
                self.delegates.push(other.clone());
            }
        }
    }
}
