// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-thread cache instance registry
//!
//! Middleware, decorators and application code asking for the same backend
//! alias must observe the same relation and transaction stacks, so each
//! thread keeps one `TaggedCache` per alias.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::cache::TaggedCache;

thread_local! {
    static INSTANCES: RefCell<HashMap<String, Rc<TaggedCache>>> = RefCell::new(HashMap::new());
}

/// The calling thread's cache instance for `alias`, built by `init` on first
/// use and shared afterwards.
pub fn cache_instance<F>(alias: &str, init: F) -> Rc<TaggedCache>
where
    F: FnOnce() -> TaggedCache,
{
    INSTANCES.with(|instances| {
        let mut instances = instances.borrow_mut();
        if let Some(existing) = instances.get(alias) {
            return Rc::clone(existing);
        }
        let created = Rc::new(init());
        instances.insert(alias.to_owned(), Rc::clone(&created));
        created
    })
}

/// Close and drop every instance of the calling thread. Typically wired to a
/// request-finished hook.
pub fn close_instances() {
    INSTANCES.with(|instances| {
        for (_, instance) in instances.borrow_mut().drain() {
            instance.close();
        }
    });
}
