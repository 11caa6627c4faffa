// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Tag lock-state records
//!
//! The acquired/released records form a cooperative, TTL-bounded lock over a
//! tag. An acquired record expires quickly so a crashed writer cannot block
//! readers indefinitely; the released record outlives it and carries the
//! replication delay, so transactions that overlap the invalidating
//! transaction's release window refuse to publish under the tag.

use serde::{Deserialize, Serialize};

use crate::txn::TransactionView;

/// Lock-accounting record written next to a tag's version record.
///
/// At any moment a tag has at most one record of each variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TagState {
    /// Written when a transaction takes a tag for update; `time` is the
    /// transaction's start time.
    Acquired { session_id: String, time: f64 },
    /// Written when the owning transaction finishes; `time` is the
    /// transaction's end time and `delay` the replication lag in seconds.
    Released {
        session_id: String,
        time: f64,
        delay: u64,
    },
}

impl TagState {
    pub fn acquired(txn: &TransactionView) -> Self {
        TagState::Acquired {
            session_id: txn.session_id().to_owned(),
            time: txn.start_time(),
        }
    }

    pub fn released(txn: &TransactionView, delay: u64) -> Self {
        TagState::Released {
            session_id: txn.session_id().to_owned(),
            time: txn.end_time(),
            delay,
        }
    }

    /// Whether this record blocks `txn` from publishing under the tag.
    pub fn is_locked(&self, txn: &TransactionView) -> bool {
        match self {
            // Acquired by the current session: ignore it.
            TagState::Acquired { session_id, .. } => txn.session_id() != session_id,
            TagState::Released {
                session_id,
                time,
                delay,
            } => {
                if txn.session_id() == session_id {
                    // Released by the current session: ignore it.
                    false
                } else {
                    // No cache may be published by transactions started
                    // earlier than the release window's end, or a reader
                    // racing the replica could capture pre-invalidation data.
                    txn.start_time() <= time + *delay as f64
                }
            }
        }
    }

    /// True when `self` is a released record superseding `acquired`: written
    /// by the same session, strictly after the acquire. A concurrent
    /// re-acquire of the tag keeps the acquired record authoritative.
    pub fn is_released(&self, acquired: &TagState) -> bool {
        match (self, acquired) {
            (
                TagState::Released {
                    session_id, time, ..
                },
                TagState::Acquired {
                    session_id: acquired_session,
                    time: acquired_time,
                },
            ) => session_id == acquired_session && time > acquired_time,
            _ => false,
        }
    }
}

/// Combined rule when both records may be present: the released record wins
/// only when there is no acquire, or when it supersedes the acquire.
pub fn effective_state<'a>(
    acquired: Option<&'a TagState>,
    released: Option<&'a TagState>,
) -> Option<&'a TagState> {
    match (acquired, released) {
        (None, None) => None,
        (Some(acquired), None) => Some(acquired),
        (None, Some(released)) => Some(released),
        (Some(acquired), Some(released)) => {
            if released.is_released(acquired) {
                Some(released)
            } else {
                Some(acquired)
            }
        }
    }
}
