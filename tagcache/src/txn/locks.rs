// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Isolation-level lock strategies
//!
//! A [`DependencyLock`] owns the cache accessor and the configured
//! replication delay, and decides per isolation level what acquiring and
//! releasing a dependency means. Evaluation always delegates to the
//! dependency itself.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheStore;
use crate::deps::Dependency;
use crate::error::DependencyLocked;
use crate::txn::isolation::IsolationLevel;
use crate::txn::transaction::TransactionView;

/// Per-isolation-level acquire/release policy over cache dependencies.
pub struct DependencyLock {
    store: Arc<dyn CacheStore>,
    isolation: IsolationLevel,
    /// Upstream replication latency in seconds (master/replica lag).
    delay: u64,
}

impl DependencyLock {
    pub fn new(store: Arc<dyn CacheStore>, isolation: IsolationLevel, delay: u64) -> Self {
        Self {
            store,
            isolation,
            delay,
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn delay(&self) -> u64 {
        self.delay
    }

    /// Pre-write check, always delegated to the dependency.
    pub fn evaluate(
        &self,
        dependency: &mut Dependency,
        txn: &TransactionView,
        version: Option<u64>,
    ) -> Result<(), DependencyLocked> {
        dependency.evaluate(&self.store, txn, version)
    }

    pub fn acquire(&self, dependency: &Dependency, txn: &TransactionView, version: Option<u64>) {
        match self.isolation {
            IsolationLevel::ReadUncommitted | IsolationLevel::ReadCommitted => {}
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable => {
                dependency.acquire(&self.store, txn, version)
            }
        }
    }

    pub fn release(&self, dependency: &Dependency, txn: &TransactionView, version: Option<u64>) {
        match self.isolation {
            IsolationLevel::ReadUncommitted => {
                self.invalidate_delayed(dependency, version);
            }
            IsolationLevel::ReadCommitted => {
                dependency.invalidate(&self.store, version);
                self.invalidate_delayed(dependency, version);
            }
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable => {
                dependency.release(&self.store, txn, self.delay, version)
            }
        }
    }

    /// One-shot timer invalidating the dependency once the replica has caught
    /// up. Best-effort: it is not cancellable and may fire after the process
    /// starts shutting down.
    fn invalidate_delayed(&self, dependency: &Dependency, version: Option<u64>) {
        if self.delay == 0 {
            return;
        }
        let store = Arc::clone(&self.store);
        let dependency = dependency.clone();
        let delay = self.delay;
        log::debug!("scheduling invalidation in {}s for replica catch-up", delay);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(delay));
            dependency.invalidate(&store, version);
            log::debug!("delayed invalidation fired after {}s", delay);
        });
    }
}
