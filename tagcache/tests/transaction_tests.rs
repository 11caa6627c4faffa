//! Transactional behavior: savepoints, isolation-level lock strategies and
//! concurrent-writer races across sessions.

#[path = "testutils/mod.rs"]
mod testutils;

use std::sync::mpsc;
use std::sync::Arc;

use serde_json::json;
use tagcache::{CacheSettings, CacheStore, IsolationLevel, MemoryStore};
use testutils::TestFixture;

fn settings(isolation: IsolationLevel) -> CacheSettings {
    CacheSettings::default().with_isolation(isolation)
}

#[test]
fn test_invalidate_then_set_inside_one_transaction() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    cache.set_tagged("n1", json!("stale"), ["t1"], None, None);

    cache.transaction().begin();
    cache.invalidate_tags(["t1"], None);
    cache.set_tagged("n1", json!("v1"), ["t1"], None, None);
    // The same session ignores its own lock records, so the rewrite is
    // readable inside the transaction.
    assert_eq!(cache.get("n1", None), Some(json!("v1")));
    cache.transaction().finish();

    // READ COMMITTED releases by invalidating again, so the entry written
    // during the transaction is gone right after it.
    assert_eq!(cache.get("n1", None), None);
}

#[test]
fn test_repeatable_read_keeps_own_write_after_finish() {
    let fixture = TestFixture::with_settings(settings(IsolationLevel::RepeatableRead));
    let cache = &fixture.cache;

    cache.transaction().begin();
    cache.invalidate_tags(["t1"], None);
    cache.set_tagged("n1", json!("v1"), ["t1"], None, None);
    cache.transaction().finish();

    // Release wrote lock-state records instead of re-invalidating; the
    // version minted by this session's own write is still current.
    assert_eq!(cache.get("n1", None), Some(json!("v1")));
}

#[test]
fn test_scoped_transaction_helper() {
    let fixture = TestFixture::new();
    let cache = &fixture.cache;

    cache.transaction().scoped(|| {
        cache.invalidate_tags(["t1"], None);
        cache.set_tagged("n1", json!("v1"), ["t1"], None, None);
        assert!(cache.transaction().in_transaction());
    });
    assert!(!cache.transaction().in_transaction());
}

#[test]
fn test_savepoint_tags_release_with_the_root() {
    let fixture = TestFixture::with_settings(settings(IsolationLevel::RepeatableRead));
    let cache = &fixture.cache;

    cache.transaction().begin();
    cache.transaction().begin();
    cache.invalidate_tags(["t1"], None);
    cache.transaction().finish();

    // The savepoint finished but the root did not: another session must
    // still see the tag as held.
    let acquired = fixture
        .store
        .get(&tagcache::tagging::acquired_key("t1"), None);
    assert!(acquired.is_some());
    let released = fixture
        .store
        .get(&tagcache::tagging::released_key("t1"), None);
    assert!(released.is_none());

    cache.transaction().finish();
    let released = fixture
        .store
        .get(&tagcache::tagging::released_key("t1"), None);
    assert!(released.is_some());
}

/// Drives a writer session on its own thread, so it holds a distinct session
/// id, and steps it in lock step with the test body.
struct RemoteWriter {
    commands: mpsc::Sender<&'static str>,
    acks: mpsc::Receiver<&'static str>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl RemoteWriter {
    fn spawn(store: Arc<MemoryStore>, settings: CacheSettings) -> Self {
        let (commands, remote_commands) = mpsc::channel::<&'static str>();
        let (remote_acks, acks) = mpsc::channel::<&'static str>();
        let handle = std::thread::spawn(move || {
            let cache = TestFixture::sibling_cache(&store, settings);
            for command in remote_commands {
                match command {
                    "begin-and-invalidate" => {
                        cache.transaction().begin();
                        cache.invalidate_tags(["T"], None);
                    }
                    "finish" => cache.transaction().finish(),
                    "stop" => break,
                    other => panic!("unknown command: {}", other),
                }
                remote_acks.send("done").unwrap();
            }
        });
        Self {
            commands,
            acks,
            handle: Some(handle),
        }
    }

    fn run(&self, command: &'static str) {
        self.commands.send(command).unwrap();
        assert_eq!(self.acks.recv().unwrap(), "done");
    }
}

impl Drop for RemoteWriter {
    fn drop(&mut self) {
        let _ = self.commands.send("stop");
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[test]
fn test_concurrent_write_is_dropped_while_tag_is_acquired() {
    let fixture = TestFixture::with_settings(settings(IsolationLevel::RepeatableRead));
    let writer = RemoteWriter::spawn(
        Arc::clone(&fixture.store),
        settings(IsolationLevel::RepeatableRead),
    );

    writer.run("begin-and-invalidate");

    // The other session holds T: our write must be silently dropped.
    fixture
        .cache
        .set_tagged("n1", json!("v1"), ["T"], None, None);
    assert_eq!(fixture.cache.get("n1", None), None);

    writer.run("finish");

    // The writer released with no replication delay and our session starts a
    // fresh (detached) transaction view after the release: free to publish.
    fixture
        .cache
        .set_tagged("n1", json!("v1"), ["T"], None, None);
    assert_eq!(fixture.cache.get("n1", None), Some(json!("v1")));
}

#[test]
fn test_transaction_overlapping_the_release_cannot_publish() {
    let fixture = TestFixture::with_settings(settings(IsolationLevel::RepeatableRead));
    let writer = RemoteWriter::spawn(
        Arc::clone(&fixture.store),
        settings(IsolationLevel::RepeatableRead),
    );

    writer.run("begin-and-invalidate");

    // Our transaction starts before the writer finishes.
    fixture.cache.transaction().begin();
    writer.run("finish");

    // Started before the release: still locked out.
    fixture
        .cache
        .set_tagged("n1", json!("v1"), ["T"], None, None);
    assert_eq!(fixture.cache.get("n1", None), None);
    fixture.cache.transaction().finish();

    // A transaction started after the release window may publish.
    fixture.cache.transaction().scoped(|| {
        fixture
            .cache
            .set_tagged("n1", json!("v1"), ["T"], None, None);
    });
    assert_eq!(fixture.cache.get("n1", None), Some(json!("v1")));
}

#[test]
fn test_replication_delay_extends_the_lock_window() {
    let delayed = settings(IsolationLevel::RepeatableRead).with_delay(30);
    let fixture = TestFixture::with_settings(delayed.clone());
    let writer = RemoteWriter::spawn(Arc::clone(&fixture.store), delayed);

    writer.run("begin-and-invalidate");
    writer.run("finish");

    // Released, but the replica may lag up to 30s behind: any session
    // starting inside the window still sees the tag as locked.
    fixture
        .cache
        .set_tagged("n1", json!("v1"), ["T"], None, None);
    assert_eq!(fixture.cache.get("n1", None), None);
}

#[test]
fn test_isolation_ladder_on_the_same_race() {
    // The same two-session race, observed under each isolation level: the
    // weaker levels let the overlapping write through, the stronger block it.
    for (isolation, write_survives) in [
        (IsolationLevel::ReadUncommitted, true),
        (IsolationLevel::ReadCommitted, true),
        (IsolationLevel::RepeatableRead, false),
        (IsolationLevel::Serializable, false),
    ] {
        let fixture = TestFixture::with_settings(settings(isolation));
        let writer = RemoteWriter::spawn(Arc::clone(&fixture.store), settings(isolation));

        writer.run("begin-and-invalidate");
        fixture
            .cache
            .set_tagged("n1", json!("v1"), ["T"], None, None);

        let written = fixture.store.get("n1", None).is_some();
        assert_eq!(
            written, write_survives,
            "unexpected race outcome under {}",
            isolation
        );
    }
}
