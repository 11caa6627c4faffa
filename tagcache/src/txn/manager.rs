// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction manager
//!
//! Owns the per-thread stack of transactions and savepoints. When nothing is
//! active, operations run against a detached view whose clock is "now" and
//! whose dependency bookkeeping is a no-op.

use std::cell::RefCell;
use std::sync::Arc;

use crate::deps::Dependency;
use crate::error::DependencyLocked;
use crate::session::ThreadAffinity;
use crate::txn::locks::DependencyLock;
use crate::txn::transaction::{Transaction, TransactionView};

/// Lifecycle of the current transaction chain.
pub struct TransactionManager {
    lock: Arc<DependencyLock>,
    current: Option<Transaction>,
}

impl TransactionManager {
    pub fn new(lock: Arc<DependencyLock>) -> Self {
        Self {
            lock,
            current: None,
        }
    }

    pub fn lock(&self) -> &Arc<DependencyLock> {
        &self.lock
    }

    pub fn in_transaction(&self) -> bool {
        self.current.is_some()
    }

    /// Push a new transaction: a root when idle, a savepoint otherwise.
    pub fn begin(&mut self) -> &Transaction {
        let txn = match self.current.take() {
            Some(parent) => {
                log::debug!("beginning savepoint");
                Transaction::savepoint(parent)
            }
            None => {
                log::debug!("beginning transaction");
                Transaction::root()
            }
        };
        self.current.insert(txn)
    }

    /// Finish the current transaction and make its parent current.
    pub fn finish(&mut self) {
        if let Some(mut txn) = self.current.take() {
            log::debug!(
                "finishing {}",
                if txn.is_savepoint() {
                    "savepoint"
                } else {
                    "transaction"
                }
            );
            txn.finish(&self.lock);
            self.current = txn.into_parent();
        }
    }

    /// Finish until no transaction remains active.
    pub fn flush(&mut self) {
        while self.current.is_some() {
            self.finish();
        }
    }

    /// View of the current transaction, or a detached one when idle.
    pub fn current_view(&self) -> TransactionView {
        self.current
            .as_ref()
            .map(Transaction::view)
            .unwrap_or_else(TransactionView::detached)
    }

    /// Pre-write check against the current transaction's lock strategy.
    pub fn evaluate(
        &self,
        dependency: &mut Dependency,
        version: Option<u64>,
    ) -> Result<(), DependencyLocked> {
        self.lock
            .evaluate(dependency, &self.current_view(), version)
    }

    /// Record a dependency on the current transaction for release at finish,
    /// acquiring its lock state now. No-op when idle.
    pub fn add_dependency(&mut self, dependency: &Dependency, version: Option<u64>) {
        if let Some(txn) = self.current.as_mut() {
            txn.add_dependency(&self.lock, dependency, version);
        }
    }
}

/// Thread-affine facade over [`TransactionManager`].
///
/// The manager is owned by the thread that created it; any call from another
/// thread is a programming error and panics. `flush` is exempt so teardown
/// paths can always drain the stack.
pub struct ThreadBoundTransactionManager {
    inner: RefCell<TransactionManager>,
    affinity: ThreadAffinity,
}

impl ThreadBoundTransactionManager {
    pub fn new(manager: TransactionManager) -> Self {
        Self {
            inner: RefCell::new(manager),
            affinity: ThreadAffinity::new(),
        }
    }

    pub fn begin(&self) {
        self.affinity.check("TransactionManager");
        self.inner.borrow_mut().begin();
    }

    pub fn finish(&self) {
        self.affinity.check("TransactionManager");
        self.inner.borrow_mut().finish();
    }

    pub fn flush(&self) {
        self.inner.borrow_mut().flush();
    }

    pub fn in_transaction(&self) -> bool {
        self.affinity.check("TransactionManager");
        self.inner.borrow().in_transaction()
    }

    pub fn current_view(&self) -> TransactionView {
        self.affinity.check("TransactionManager");
        self.inner.borrow().current_view()
    }

    pub fn evaluate(
        &self,
        dependency: &mut Dependency,
        version: Option<u64>,
    ) -> Result<(), DependencyLocked> {
        self.affinity.check("TransactionManager");
        self.inner.borrow().evaluate(dependency, version)
    }

    pub fn add_dependency(&self, dependency: &Dependency, version: Option<u64>) {
        self.affinity.check("TransactionManager");
        self.inner.borrow_mut().add_dependency(dependency, version);
    }

    /// Run `f` inside a transaction scope: begin before, finish after.
    pub fn scoped<R>(&self, f: impl FnOnce() -> R) -> R {
        self.begin();
        let result = f();
        self.finish();
        result
    }
}
