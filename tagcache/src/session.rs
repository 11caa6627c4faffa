// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-thread session identity and thread-affinity enforcement
//!
//! Lock-state records written to the shared cache must be recognisable by the
//! session that wrote them, so every thread carries a stable identifier of the
//! form `<hostname>.<pid>.<thread-seq>`. The thread component is a
//! process-wide sequence number assigned on first use, which is stable for
//! the thread's lifetime on every platform.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;

use once_cell::sync::Lazy;

static HOST: Lazy<String> =
    Lazy::new(|| gethostname::gethostname().to_string_lossy().into_owned());

static NEXT_THREAD_SEQ: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static SESSION_ID: String = format!(
        "{}.{}.{}",
        HOST.as_str(),
        std::process::id(),
        NEXT_THREAD_SEQ.fetch_add(1, Ordering::Relaxed),
    );
}

/// The calling thread's stable session identifier, computed once per thread.
pub fn session_id() -> String {
    SESSION_ID.with(|id| id.clone())
}

/// Wall-clock seconds since the Unix epoch, with sub-second precision.
pub(crate) fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Records the thread that created an object and rejects use from any other.
///
/// The relation and transaction managers are owned by exactly one thread;
/// sharing them is a programming error that must fail loudly rather than
/// corrupt the per-thread stacks.
#[derive(Debug)]
pub struct ThreadAffinity {
    owner: ThreadId,
}

impl ThreadAffinity {
    pub fn new() -> Self {
        Self {
            owner: std::thread::current().id(),
        }
    }

    /// Panics when called from a thread other than the owning one.
    pub fn check(&self, what: &str) {
        let current = std::thread::current().id();
        if current != self.owner {
            panic!(
                "{} objects created in a thread can only be used in that same thread \
                 (created in {:?}, called from {:?})",
                what, self.owner, current
            );
        }
    }
}

impl Default for ThreadAffinity {
    fn default() -> Self {
        Self::new()
    }
}
