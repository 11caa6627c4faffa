//! End-to-end tests of tagged caching: round trips, invalidation, descendant
//! propagation and batched multi-key reads.

#[path = "testutils/mod.rs"]
mod testutils;

use std::sync::Arc;

use serde_json::json;
use tagcache::{tagging, CacheSettings, CacheStore, Dependency, TaggedCache};
use testutils::{CountingStore, TestFixture};

#[test]
fn test_set_then_get_then_invalidate() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    cache.set_tagged("n1", json!("v1"), ["t1"], None, None);
    assert_eq!(cache.get("n1", None), Some(json!("v1")));

    cache.invalidate_tags(["t1"], None);
    assert_eq!(cache.get("n1", None), None);
}

#[test]
fn test_rewrite_after_invalidation_is_valid_again() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    cache.set_tagged("n1", json!("v1"), ["t1"], None, None);
    cache.invalidate_tags(["t1"], None);
    cache.set_tagged("n1", json!("v2"), ["t1"], None, None);
    assert_eq!(cache.get("n1", None), Some(json!("v2")));
}

#[test]
fn test_artifacts_share_tags() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    cache.set_tagged("n1", json!("v1"), ["shared", "only1"], None, None);
    cache.set_tagged("n2", json!("v2"), ["shared"], None, None);

    cache.invalidate_tags(["shared"], None);
    assert_eq!(cache.get("n1", None), None);
    assert_eq!(cache.get("n2", None), None);
}

#[test]
fn test_nested_fragment_tags_reach_the_parent() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    // n2 is produced while n1 is in progress.
    cache.begin("n1");
    cache.set_tagged("n2", json!("v2"), ["t2"], None, None);
    cache.set_tagged("n1", json!("v1"), ["t1"], None, None);

    assert_eq!(cache.get("n1", None), Some(json!("v1")));
    assert_eq!(cache.get("n2", None), Some(json!("v2")));

    // Invalidating the child's tag misses both fragments.
    cache.invalidate_tags(["t2"], None);
    assert_eq!(cache.get("n1", None), None);
    assert_eq!(cache.get("n2", None), None);
}

#[test]
fn test_deeper_nesting_propagates_transitively() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    cache.begin("outer");
    cache.begin("middle");
    cache.set_tagged("leaf", json!("vl"), ["leaf-tag"], None, None);
    cache.set("middle", json!("vm"), None, None, None);
    cache.set("outer", json!("vo"), None, None, None);

    cache.invalidate_tags(["leaf-tag"], None);
    assert_eq!(cache.get("leaf", None), None);
    assert_eq!(cache.get("middle", None), None);
    assert_eq!(cache.get("outer", None), None);
}

#[test]
fn test_parent_invalidation_spares_the_child() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    cache.begin("n1");
    cache.set_tagged("n2", json!("v2"), ["t2"], None, None);
    cache.set_tagged("n1", json!("v1"), ["t1"], None, None);

    // The parent's own tag says nothing about the child.
    cache.invalidate_tags(["t1"], None);
    assert_eq!(cache.get("n1", None), None);
    assert_eq!(cache.get("n2", None), Some(json!("v2")));
}

#[test]
fn test_get_many_drops_only_stale_keys() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    cache.set_tagged("n1", json!("v1"), ["t1"], None, None);
    cache.set_tagged("n2", json!("v2"), ["t2"], None, None);
    cache.invalidate_tags(["t1"], None);

    let values = cache.get_many(&["n1".to_string(), "n2".to_string()], None);
    assert_eq!(values.len(), 1);
    assert_eq!(values.get("n2"), Some(&json!("v2")));
}

#[test]
fn test_get_many_batches_tag_validation() {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(CountingStore::new());
    let cache = TaggedCache::new(
        Arc::clone(&store) as Arc<dyn CacheStore>,
        CacheSettings::default(),
    );

    cache.set_tagged("n1", json!("v1"), ["t1"], None, None);
    cache.set_tagged("n2", json!("v2"), ["t2"], None, None);
    store.reset_calls();

    let values = cache.get_many(&["n1".to_string(), "n2".to_string()], None);
    assert_eq!(values.len(), 2);

    // One batched fetch for the artifacts, one for every tag version read.
    let calls = store.get_many_calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].contains("n1") && calls[0].contains("n2"));
    assert!(calls[1].contains(&tagging::tag_key("t1")));
    assert!(calls[1].contains(&tagging::tag_key("t2")));
}

#[test]
fn test_get_many_registers_siblings_not_a_chain() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    cache.set_tagged("a", json!("va"), ["ta"], None, None);
    cache.set_tagged("b", json!("vb"), ["tb"], None, None);

    cache.begin("outer");
    let values = cache.get_many(&["a".to_string(), "b".to_string()], None);
    assert_eq!(values.len(), 2);
    cache.set("outer", json!("vo"), None, None, None);

    // Both fetched keys contributed their tags to the outer fragment...
    cache.invalidate_tags(["ta"], None);
    assert_eq!(cache.get("outer", None), None);

    // ...but not to each other.
    assert_eq!(cache.get("b", None), Some(json!("vb")));
}

#[test]
fn test_composite_dependency_invalidation() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    let mut composite = Dependency::Composite(Default::default());
    composite.extend(&Dependency::tags(["t1"]));
    composite.extend(&Dependency::Dummy);
    cache.set("n1", json!("v1"), Some(composite), None, None);
    assert_eq!(cache.get("n1", None), Some(json!("v1")));

    // Any invalid delegate invalidates the whole composite.
    cache.invalidate_tags(["t1"], None);
    assert_eq!(cache.get("n1", None), None);
}

#[test]
fn test_raw_entries_written_by_other_clients_pass_through() {
    let fixture = TestFixture::new();
    fixture.store.set(
        "legacy",
        tagcache::CacheEntry::Raw(json!(["untouched"])),
        None,
        None,
    );
    assert_eq!(
        fixture.cache.get("legacy", None),
        Some(json!(["untouched"]))
    );
}

#[test]
fn test_invalidation_deletes_the_version_records() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    cache.set_tagged("n1", json!("v1"), ["t1"], None, None);
    assert!(fixture.store.get(&tagging::tag_key("t1"), None).is_some());

    cache.invalidate_tags(["t1"], None);
    assert!(fixture.store.get(&tagging::tag_key("t1"), None).is_none());

    // The next writer mints a fresh version.
    cache.set_tagged("n2", json!("v2"), ["t1"], None, None);
    assert!(fixture.store.get(&tagging::tag_key("t1"), None).is_some());
}

#[test]
fn test_get_or_set_rebuilds_after_invalidation() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    let first = cache.get_or_set("n1", Some(Dependency::tags(["t1"])), None, None, || {
        json!("generation-1")
    });
    assert_eq!(first, json!("generation-1"));

    cache.invalidate_tags(["t1"], None);
    let second = cache.get_or_set("n1", Some(Dependency::tags(["t1"])), None, None, || {
        json!("generation-2")
    });
    assert_eq!(second, json!("generation-2"));
    assert_eq!(cache.get("n1", None), Some(json!("generation-2")));
}

#[test]
fn test_artifact_ttl_expires_independently_of_tags() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    cache.set_tagged(
        "short",
        json!("v"),
        ["t1"],
        Some(std::time::Duration::from_millis(20)),
        None,
    );
    assert_eq!(cache.get("short", None), Some(json!("v")));

    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(cache.get("short", None), None);

    // The tag's version record has its own 24h TTL and is still there.
    assert!(fixture.store.get(&tagging::tag_key("t1"), None).is_some());
}

#[test]
fn test_get_many_passes_raw_entries_through() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    cache.set_tagged("tagged", json!("vt"), ["t1"], None, None);
    fixture
        .store
        .set("legacy", tagcache::CacheEntry::Raw(json!("vr")), None, None);

    let values = cache.get_many(&["tagged".to_string(), "legacy".to_string()], None);
    assert_eq!(values.get("tagged"), Some(&json!("vt")));
    assert_eq!(values.get("legacy"), Some(&json!("vr")));
}

#[test]
fn test_invalidate_via_dependency_object() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    cache.set_tagged("n1", json!("v1"), ["t1"], None, None);
    cache.set_tagged("n2", json!("v2"), ["t2"], None, None);

    let mut both = Dependency::Composite(Default::default());
    both.extend(&Dependency::tags(["t1"]));
    both.extend(&Dependency::tags(["t2"]));
    cache.invalidate_dependency(&both, None);

    assert_eq!(cache.get("n1", None), None);
    assert_eq!(cache.get("n2", None), None);
}

#[test]
fn test_full_stack_over_a_prefixed_store() {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(tagcache::PrefixedStore::new(
        tagcache::MemoryStore::new(),
        "site",
    ));
    let cache = TaggedCache::new(
        Arc::clone(&store) as Arc<dyn CacheStore>,
        CacheSettings::default(),
    );

    cache.set_tagged("n1", json!("v1"), ["t1"], None, None);
    assert_eq!(cache.get("n1", None), Some(json!("v1")));

    // Tag records live under the prefix too.
    let tag_record = store
        .inner()
        .get(&format!("site:1:{}", tagging::tag_key("t1")), None);
    assert!(tag_record.is_some());

    cache.invalidate_tags(["t1"], None);
    assert_eq!(cache.get("n1", None), None);
}
