// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Tag key derivation and version minting
//!
//! Every tag owns up to three records in the underlying cache: a version
//! record under `tag_<libver>_<md5(name)>` and two lock-state records under
//! `acquired_`/`released_` prefixes of the same key. The library-version
//! prefix acts as a global invalidation lever on format changes and must not
//! change within a running process.

use std::time::Duration;

use once_cell::sync::Lazy;

/// A named invalidation bucket; many artifacts may share a tag.
pub type Tag = String;

/// Opaque token attached to a tag; rotated by invalidation.
pub type TagVersion = String;

/// TTL of a tag's version record.
pub const TAG_VERSION_TTL: Duration = Duration::from_secs(24 * 3600);

/// TTL of a tag's acquired lock-state record. Released records outlive this
/// so a release stays observable after the acquire expires.
pub const TAG_STATE_TTL: Duration = Duration::from_secs(5);

static KEY_PREFIX: Lazy<String> = Lazy::new(|| crate::VERSION.replace('.', ""));

/// Cache key of a tag's version record.
pub fn tag_key(name: &str) -> String {
    format!(
        "tag_{}_{:x}",
        KEY_PREFIX.as_str(),
        md5::compute(name.as_bytes())
    )
}

/// Cache key of a tag's acquired lock-state record.
pub fn acquired_key(name: &str) -> String {
    format!("acquired_{}", tag_key(name))
}

/// Cache key of a tag's released lock-state record.
pub fn released_key(name: &str) -> String {
    format!("released_{}", tag_key(name))
}

/// Mint a fresh, unique tag version.
pub fn generate_tag_version() -> TagVersion {
    let seed = format!(
        "{}{}{}",
        fastrand::u64(..),
        crate::session::session_id(),
        crate::session::unix_now()
    );
    format!("{:x}", md5::compute(seed.as_bytes()))
}
