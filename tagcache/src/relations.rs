// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Relation tracking of in-progress cache creations
//!
//! While a cached fragment is being produced, child fragments read or written
//! underneath it must contribute their tags to the enclosing fragment's
//! dependency. Nodes form a parent-linked tree keyed by cache key; adding a
//! dependency to a node propagates it to every ancestor.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::deps::{CompositeDependency, Dependency};
use crate::session::ThreadAffinity;

/// A frame in the stack of in-progress cache creations.
#[derive(Debug)]
pub struct CacheNode {
    key: String,
    parent: Option<Rc<RefCell<CacheNode>>>,
    deps: HashMap<Option<u64>, CompositeDependency>,
}

impl CacheNode {
    fn new(key: String, parent: Option<Rc<RefCell<CacheNode>>>) -> Self {
        Self {
            key,
            parent,
            deps: HashMap::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn parent(&self) -> Option<Rc<RefCell<CacheNode>>> {
        self.parent.clone()
    }

    /// Extend this node's composite for `version` and propagate upward, so
    /// ancestors accumulate their descendants' tags.
    pub fn add_dependency(&mut self, dependency: &Dependency, version: Option<u64>) {
        self.deps.entry(version).or_default().extend(dependency);
        if let Some(parent) = &self.parent {
            parent.borrow_mut().add_dependency(dependency, version);
        }
    }

    /// The dependency accumulated for `version`, or the identity element.
    pub fn get_dependency(&self, version: Option<u64>) -> Dependency {
        self.deps
            .get(&version)
            .map(|composite| Dependency::Composite(composite.clone()))
            .unwrap_or(Dependency::Dummy)
    }
}

/// Tracks the tree of in-progress cache keys for one thread.
///
/// Keyed by cache key rather than stacked, because recursive cache creation
/// of the same key is not possible.
#[derive(Debug, Default)]
pub struct RelationManager {
    current: Option<Rc<RefCell<CacheNode>>>,
    nodes: HashMap<String, Rc<RefCell<CacheNode>>>,
}

impl RelationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the node for `key`, parented to the current node.
    pub fn get(&mut self, key: &str) -> Rc<RefCell<CacheNode>> {
        if let Some(existing) = self.nodes.get(key) {
            return Rc::clone(existing);
        }
        let node = Rc::new(RefCell::new(CacheNode::new(
            key.to_owned(),
            self.current.clone(),
        )));
        self.nodes.insert(key.to_owned(), Rc::clone(&node));
        node
    }

    /// Detach and return the node for `key`. When it was current, its parent
    /// becomes current.
    pub fn pop(&mut self, key: &str) -> Option<Rc<RefCell<CacheNode>>> {
        let node = self.nodes.remove(key)?;
        let was_current = self
            .current
            .as_ref()
            .map(|current| Rc::ptr_eq(current, &node))
            .unwrap_or(false);
        if was_current {
            self.current = node.borrow().parent();
        }
        Some(node)
    }

    /// The node currently being produced, if any.
    pub fn current(&self) -> Option<Rc<RefCell<CacheNode>>> {
        self.current.clone()
    }

    /// Make the node for `key` current, creating it if needed.
    pub fn set_current(&mut self, key: &str) {
        let node = self.get(key);
        self.current = Some(node);
    }

    /// Restore a previously saved current node (or none).
    pub fn set_current_node(&mut self, node: Option<Rc<RefCell<CacheNode>>>) {
        self.current = node;
    }

    /// Drop all tracked nodes. The current pointer is left untouched.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

/// Thread-affine facade over [`RelationManager`]; any call from a thread
/// other than the creating one panics.
pub struct ThreadBoundRelationManager {
    inner: RefCell<RelationManager>,
    affinity: ThreadAffinity,
}

impl ThreadBoundRelationManager {
    pub fn new(manager: RelationManager) -> Self {
        Self {
            inner: RefCell::new(manager),
            affinity: ThreadAffinity::new(),
        }
    }

    pub fn get(&self, key: &str) -> Rc<RefCell<CacheNode>> {
        self.affinity.check("RelationManager");
        self.inner.borrow_mut().get(key)
    }

    pub fn pop(&self, key: &str) -> Option<Rc<RefCell<CacheNode>>> {
        self.affinity.check("RelationManager");
        self.inner.borrow_mut().pop(key)
    }

    pub fn current(&self) -> Option<Rc<RefCell<CacheNode>>> {
        self.affinity.check("RelationManager");
        self.inner.borrow().current()
    }

    pub fn set_current(&self, key: &str) {
        self.affinity.check("RelationManager");
        self.inner.borrow_mut().set_current(key);
    }

    pub fn set_current_node(&self, node: Option<Rc<RefCell<CacheNode>>>) {
        self.affinity.check("RelationManager");
        self.inner.borrow_mut().set_current_node(node);
    }

    /// The dependency accumulated for `key` under `version`.
    pub fn get_dependency(&self, key: &str, version: Option<u64>) -> Dependency {
        self.affinity.check("RelationManager");
        let node = self.inner.borrow_mut().get(key);
        let dependency = node.borrow().get_dependency(version);
        dependency
    }

    pub fn clear(&self) {
        self.affinity.check("RelationManager");
        self.inner.borrow_mut().clear();
    }
}
