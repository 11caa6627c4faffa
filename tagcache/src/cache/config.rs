// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache instance configuration

use std::str::FromStr;

use crate::txn::IsolationLevel;

/// Tuning for one tagged cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Isolation level selecting the dependency lock strategy.
    pub isolation: IsolationLevel,
    /// Upstream replication latency in seconds (master/replica lag). Readers
    /// overlapping an invalidation by less than this see the tag as locked.
    pub delay: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::default(),
            delay: 0,
        }
    }
}

impl CacheSettings {
    pub fn new(isolation: IsolationLevel, delay: u64) -> Self {
        Self { isolation, delay }
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_delay(mut self, delay: u64) -> Self {
        self.delay = delay;
        self
    }

    /// Parse an isolation level name into settings, keeping the other fields
    /// at their defaults.
    pub fn for_isolation(name: &str) -> Result<Self, String> {
        Ok(Self::default().with_isolation(IsolationLevel::from_str(name)?))
    }
}
