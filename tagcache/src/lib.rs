// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! TagCache - a tag-based cache dependency invalidation engine
//!
//! TagCache sits on top of an arbitrary key/value cache and lets an
//! application associate each cached artifact with a set of named *tags*.
//! Invalidating a single tag invalidates every artifact that captured it,
//! without enumerating the affected keys: invalidation is version-bump based,
//! not reference-counted.
//!
//! # Features
//!
//! - **Tag dependencies**: artifacts snapshot the version of every tag they
//!   reference; a mismatch at read time is a cache miss
//! - **Concurrent-write safety**: acquired/released lock-state records keep
//!   overlapping transactions from publishing stale entries, with
//!   configurable master/replica replication delay
//! - **Isolation levels**: READ UNCOMMITTED through SERIALIZABLE lock
//!   strategies, selected per cache instance
//! - **Nested fragments**: in-progress cache creations form a parent/child
//!   stack, so a child fragment's tags propagate into its enclosing fragment
//! - **Batched reads**: deferred aggregation coalesces the tag lookups of
//!   nested fragments into single `get_many` calls
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tagcache::{CacheSettings, MemoryStore, TaggedCache};
//!
//! let store = Arc::new(MemoryStore::new());
//! let cache = TaggedCache::new(store, CacheSettings::default());
//!
//! cache.set_tagged("menu.sidebar", "rendered html".into(), ["menu"], None, None);
//! assert!(cache.get("menu.sidebar", None).is_some());
//!
//! cache.invalidate_tags(["menu"], None);
//! assert!(cache.get("menu.sidebar", None).is_none());
//! ```

pub mod cache;
pub mod defer;
pub mod deps;
pub mod error;
pub mod relations;
pub mod session;
pub mod tagging;
pub mod txn;

pub use cache::{
    cache_instance, close_instances, CacheEntry, CacheSettings, CacheStore, MemoryStore,
    PrefixedStore, TaggedCache, DEFAULT_VERSION,
};
pub use deps::{CompositeDependency, Dependency, TagState, TagsDependency};
pub use error::{DependencyError, DependencyInvalid, DependencyLocked};
pub use session::session_id;
pub use tagging::{Tag, TagVersion};
pub use txn::IsolationLevel;

/// TagCache version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// TagCache crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
