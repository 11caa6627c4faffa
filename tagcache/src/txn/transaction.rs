// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transactions and savepoints
//!
//! A root transaction owns its start/end times and the per-version composite
//! dependencies accumulated while it was current. Nested `begin`s create
//! savepoints: a savepoint delegates its clock to the root, forwards every
//! added dependency to its parent so tags bubble up, and its finish is a
//! no-op (the release happens when the root finishes).

use std::collections::HashMap;

use crate::deps::{CompositeDependency, Dependency};
use crate::session;
use crate::txn::locks::DependencyLock;

/// Point-in-time snapshot of a transaction handed to dependency operations.
///
/// Carries everything the lock protocol needs: the owning session, the start
/// time (lock checks) and the end time (release records).
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionView {
    session_id: String,
    start_time: f64,
    end_time: Option<f64>,
}

impl TransactionView {
    pub fn new(session_id: impl Into<String>, start_time: f64, end_time: Option<f64>) -> Self {
        Self {
            session_id: session_id.into(),
            start_time,
            end_time,
        }
    }

    /// View standing in when no transaction is active: the current session,
    /// with both times resolving to "now".
    pub fn detached() -> Self {
        let now = session::unix_now();
        Self::new(session::session_id(), now, Some(now))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Panics on an unfinished root transaction; that is a programmer error.
    pub fn end_time(&self) -> f64 {
        self.end_time.expect("transaction is not finished yet")
    }
}

/// A root transaction or savepoint in the per-thread transaction stack.
#[derive(Debug)]
pub struct Transaction {
    deps: HashMap<Option<u64>, CompositeDependency>,
    start_time: f64,
    end_time: Option<f64>,
    session_id: String,
    parent: Option<Box<Transaction>>,
}

impl Transaction {
    pub(crate) fn root() -> Self {
        Self {
            deps: HashMap::new(),
            start_time: session::unix_now(),
            end_time: None,
            session_id: session::session_id(),
            parent: None,
        }
    }

    pub(crate) fn savepoint(parent: Transaction) -> Self {
        let mut txn = Self::root();
        txn.parent = Some(Box::new(parent));
        txn
    }

    pub fn is_savepoint(&self) -> bool {
        self.parent.is_some()
    }

    fn root_ref(&self) -> &Transaction {
        let mut txn = self;
        while let Some(parent) = txn.parent.as_deref() {
            txn = parent;
        }
        txn
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Start time of the enclosing root transaction.
    pub fn start_time(&self) -> f64 {
        self.root_ref().start_time
    }

    /// End time of the enclosing root transaction; panics while unfinished.
    pub fn end_time(&self) -> f64 {
        self.root_ref()
            .end_time
            .expect("transaction is not finished yet")
    }

    pub(crate) fn view(&self) -> TransactionView {
        let root = self.root_ref();
        TransactionView::new(self.session_id.clone(), root.start_time, root.end_time)
    }

    /// Record `dependency` for release at root finish and acquire its lock
    /// state now. Savepoints forward to their parent so tags bubble up.
    pub(crate) fn add_dependency(
        &mut self,
        lock: &DependencyLock,
        dependency: &Dependency,
        version: Option<u64>,
    ) {
        let view = self.view();
        self.deps.entry(version).or_default().extend(dependency);
        lock.acquire(dependency, &view, version);
        if let Some(parent) = self.parent.as_mut() {
            parent.add_dependency(lock, dependency, version);
        }
    }

    /// Composite accumulated for `version` so far.
    pub fn dependency(&self, version: Option<u64>) -> Option<&CompositeDependency> {
        self.deps.get(&version)
    }

    /// Finish the transaction. A savepoint's finish is a no-op: its
    /// dependencies live on in the parent. The root stamps its end time and
    /// releases every per-version composite.
    pub(crate) fn finish(&mut self, lock: &DependencyLock) {
        if self.is_savepoint() {
            return;
        }
        self.end_time = Some(session::unix_now());
        let view = self.view();
        for (version, composite) in std::mem::take(&mut self.deps) {
            lock.release(&Dependency::Composite(composite), &view, version);
        }
    }

    pub(crate) fn into_parent(self) -> Option<Transaction> {
        self.parent.map(|parent| *parent)
    }
}
