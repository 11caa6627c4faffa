// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Deferred aggregation of batched cache reads
//!
//! A cached fragment can be composed of nested child fragments, each needing
//! a small `get_many` over tag keys. Rather than issuing many small fetches,
//! callers queue callbacks on a [`Deferred`] and merge deferreds together;
//! callbacks that share an *aggregation criterion* (same store, same version
//! namespace) are served by a single batched `get_many` when the chain is
//! driven.
//!
//! Results come back in reverse insertion order: strictly LIFO within a node,
//! and LIFO across nodes through the parent chain built by [`Deferred::merge`].

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ops::AddAssign;
use std::rc::Rc;
use std::sync::Arc;

use crate::cache::{CacheEntry, CacheStore};
use crate::error::DependencyError;
use crate::tagging::{Tag, TagVersion};

/// Slice of a batched read handed to a single callback.
pub type Batch = HashMap<String, CacheEntry>;

/// Value produced by one deferred callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Nothing,
    TagSet(HashSet<Tag>),
    VersionMap(HashMap<Tag, TagVersion>),
}

impl Resolved {
    pub fn into_tag_set(self) -> HashSet<Tag> {
        match self {
            Resolved::TagSet(tags) => tags,
            other => panic!("deferred result is not a tag set: {:?}", other),
        }
    }

    pub fn into_version_map(self) -> HashMap<Tag, TagVersion> {
        match self {
            Resolved::VersionMap(versions) => versions,
            other => panic!("deferred result is not a version map: {:?}", other),
        }
    }
}

/// Underlying reader shared by every callback with the same criterion.
#[derive(Clone)]
pub enum Executor {
    /// One batched `get_many` against a store and version namespace.
    GetMany {
        store: Arc<dyn CacheStore>,
        version: Option<u64>,
    },
    /// No underlying read; callbacks see an empty batch.
    Noop,
}

impl Executor {
    fn criterion(&self) -> Criterion {
        match self {
            Executor::GetMany { store, version } => Criterion {
                kind: ExecutorKind::GetMany,
                store: Arc::as_ptr(store) as *const () as usize,
                version: *version,
            },
            Executor::Noop => Criterion {
                kind: ExecutorKind::Noop,
                store: 0,
                version: None,
            },
        }
    }

    fn run(&self, keys: &HashSet<String>) -> Batch {
        match self {
            Executor::GetMany { store, version } => store.get_many(keys, *version),
            Executor::Noop => Batch::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ExecutorKind {
    GetMany,
    Noop,
}

/// Canonical batching key: two queued reads are served by one underlying call
/// iff their criteria are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Criterion {
    kind: ExecutorKind,
    store: usize,
    version: Option<u64>,
}

type Callback = Box<dyn FnOnce(&DeferredContext, &Batch) -> Result<Resolved, DependencyError>>;

struct QueueEntry {
    keys: HashSet<String>,
    callback: Callback,
}

struct Node {
    executor: Executor,
    criterion: Criterion,
    queue: Vec<QueueEntry>,
    parent: Option<Rc<RefCell<Node>>>,
}

/// Per-walk state shared across every `get` of one deferred chain, so each
/// criterion's batch is fetched exactly once.
#[derive(Default)]
struct WalkState {
    batches: HashMap<Criterion, Batch>,
}

/// Handed to callbacks so they can pull further results from the same walk.
pub struct DeferredContext {
    node: Rc<RefCell<Node>>,
    state: Rc<RefCell<WalkState>>,
}

impl DeferredContext {
    /// Consume and return the next queued result of the chain.
    ///
    /// Panics when the chain is already drained; callers pull exactly as many
    /// results as callbacks they queued.
    pub fn get(&self) -> Result<Resolved, DependencyError> {
        advance(&self.node, &self.state).expect("deferred chain is already drained")
    }
}

/// A chain of queued cache reads, drained in reverse insertion order.
pub struct Deferred {
    head: Rc<RefCell<Node>>,
    state: Rc<RefCell<WalkState>>,
}

impl Deferred {
    /// A deferred whose callbacks are served by one batched `get_many`.
    pub fn get_many(store: Arc<dyn CacheStore>, version: Option<u64>) -> Self {
        Self::with_executor(Executor::GetMany { store, version })
    }

    /// A deferred whose callbacks run without an underlying read.
    pub fn noop() -> Self {
        Self::with_executor(Executor::Noop)
    }

    fn with_executor(executor: Executor) -> Self {
        let criterion = executor.criterion();
        Deferred {
            head: Rc::new(RefCell::new(Node {
                executor,
                criterion,
                queue: Vec::new(),
                parent: None,
            })),
            state: Rc::new(RefCell::new(WalkState::default())),
        }
    }

    /// Queue a callback wanting `keys` from the batch. Results are delivered
    /// in reverse insertion order.
    pub fn push<F>(&mut self, keys: HashSet<String>, callback: F) -> &mut Self
    where
        F: FnOnce(&DeferredContext, &Batch) -> Result<Resolved, DependencyError> + 'static,
    {
        self.head.borrow_mut().queue.push(QueueEntry {
            keys,
            callback: Box::new(callback),
        });
        self
    }

    /// Consume and return the next queued result.
    ///
    /// Exceptions raised by callbacks surface here, after the batch they
    /// belong to has been materialised, so piggy-backed sibling reads are
    /// never lost. Panics when the chain is already drained.
    pub fn get(&self) -> Result<Resolved, DependencyError> {
        self.try_get().expect("deferred chain is already drained")
    }

    /// Like [`Deferred::get`], but `None` once every callback has been
    /// consumed.
    pub fn try_get(&self) -> Option<Result<Resolved, DependencyError>> {
        advance(&self.head, &self.state)
    }

    /// Merge `other` into `self` (the `+=` of the chain algebra).
    ///
    /// The other's parent chain is folded in first. Then, if both heads share
    /// a criterion, the other's queue is appended to ours; otherwise the
    /// other is re-parented on top and becomes the new head, preserving LIFO
    /// delivery across heterogeneous readers.
    pub fn merge(&mut self, other: Deferred) {
        self.merge_node(other.head);
    }

    fn merge_node(&mut self, other: Rc<RefCell<Node>>) {
        let parent = other.borrow_mut().parent.take();
        if let Some(parent) = parent {
            self.merge_node(parent);
        }
        let same_criterion = self.head.borrow().criterion == other.borrow().criterion;
        if same_criterion {
            let entries = std::mem::take(&mut other.borrow_mut().queue);
            self.head.borrow_mut().queue.extend(entries);
        } else {
            attach_parent(&other, Rc::clone(&self.head));
            self.head = other;
        }
    }
}

impl AddAssign for Deferred {
    fn add_assign(&mut self, other: Deferred) {
        self.merge(other);
    }
}

/// Appends `parent` at the deepest ancestor that has none yet, so merged
/// chains keep their existing ordering.
fn attach_parent(node: &Rc<RefCell<Node>>, parent: Rc<RefCell<Node>>) {
    let existing = node.borrow().parent.clone();
    match existing {
        None => node.borrow_mut().parent = Some(parent),
        Some(deeper) => attach_parent(&deeper, parent),
    }
}

fn advance(
    node: &Rc<RefCell<Node>>,
    state: &Rc<RefCell<WalkState>>,
) -> Option<Result<Resolved, DependencyError>> {
    // Walk up to the first node that still has queued callbacks.
    let mut cur = Rc::clone(node);
    let entry = loop {
        let popped = cur.borrow_mut().queue.pop();
        match popped {
            Some(entry) => break entry,
            None => {
                let parent = cur.borrow().parent.clone();
                cur = parent?;
            }
        }
    };

    let executor = cur.borrow().executor.clone();
    let criterion = cur.borrow().criterion.clone();

    let batch = if matches!(executor, Executor::Noop) {
        Batch::new()
    } else {
        let needs_fetch = !state.borrow().batches.contains_key(&criterion);
        if needs_fetch {
            let keys = aggregated_keys(&cur, &criterion, &entry.keys);
            let batch = executor.run(&keys);
            state.borrow_mut().batches.insert(criterion.clone(), batch);
        }
        let state_ref = state.borrow();
        let full = &state_ref.batches[&criterion];
        entry
            .keys
            .iter()
            .filter_map(|key| full.get(key).map(|value| (key.clone(), value.clone())))
            .collect()
    };

    let ctx = DeferredContext {
        node: cur,
        state: Rc::clone(state),
    };
    Some((entry.callback)(&ctx, &batch))
}

/// Union of the key sets of the entry being served and of every pending entry
/// in nodes sharing `criterion` from `start` upward.
fn aggregated_keys(
    start: &Rc<RefCell<Node>>,
    criterion: &Criterion,
    current: &HashSet<String>,
) -> HashSet<String> {
    let mut keys = current.clone();
    let mut node = Some(Rc::clone(start));
    while let Some(n) = node {
        {
            let n_ref = n.borrow();
            if n_ref.criterion == *criterion {
                for entry in &n_ref.queue {
                    keys.extend(entry.keys.iter().cloned());
                }
            }
        }
        node = n.borrow().parent.clone();
    }
    keys
}
