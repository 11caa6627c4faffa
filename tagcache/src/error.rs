// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Dependency error taxonomy
//!
//! Two lineages: `DependencyLocked` is transient and raised before a write
//! when a concurrent session holds one of the tags; `DependencyInvalid` is
//! raised at read time and is permanent for the affected key. Composite
//! variants aggregate per-delegate errors without suppressing siblings.

use std::collections::HashSet;

use thiserror::Error;

use crate::tagging::Tag;

/// Raised by pre-write evaluation when a concurrent transaction holds one of
/// the dependency's tags. Writers drop the write; the key simply is not
/// cached this round.
#[derive(Debug, Clone, Error)]
pub enum DependencyLocked {
    #[error("tags locked by a concurrent session: {tags:?}")]
    Tags { tags: HashSet<Tag> },

    #[error("{} delegate dependencies are locked", .children.len())]
    Composite { children: Vec<DependencyLocked> },
}

impl DependencyLocked {
    /// Flat iteration over every locked tag in the tree.
    pub fn items(&self) -> Box<dyn Iterator<Item = &Tag> + '_> {
        match self {
            DependencyLocked::Tags { tags } => Box::new(tags.iter()),
            DependencyLocked::Composite { children } => {
                Box::new(children.iter().flat_map(|child| child.items()))
            }
        }
    }

    /// Direct children of a composite error; empty for leaf errors.
    pub fn children(&self) -> &[DependencyLocked] {
        match self {
            DependencyLocked::Composite { children } => children,
            _ => &[],
        }
    }
}

/// Raised by read-time validation when an artifact's captured tag versions no
/// longer match the current ones. Readers translate this into a cache miss.
#[derive(Debug, Clone, Error)]
pub enum DependencyInvalid {
    #[error("tag versions changed since the value was cached: {tags:?}")]
    Tags { tags: HashSet<Tag> },

    #[error("{} delegate dependencies are invalid", .children.len())]
    Composite { children: Vec<DependencyInvalid> },
}

impl DependencyInvalid {
    /// Flat iteration over every stale tag in the tree.
    pub fn errors(&self) -> Box<dyn Iterator<Item = &Tag> + '_> {
        match self {
            DependencyInvalid::Tags { tags } => Box::new(tags.iter()),
            DependencyInvalid::Composite { children } => {
                Box::new(children.iter().flat_map(|child| child.errors()))
            }
        }
    }

    /// Direct children of a composite error; empty for leaf errors.
    pub fn children(&self) -> &[DependencyInvalid] {
        match self {
            DependencyInvalid::Composite { children } => children,
            _ => &[],
        }
    }
}

/// Union of the two lineages, produced by deferred callbacks.
#[derive(Debug, Clone, Error)]
pub enum DependencyError {
    #[error(transparent)]
    Locked(#[from] DependencyLocked),

    #[error(transparent)]
    Invalid(#[from] DependencyInvalid),
}
