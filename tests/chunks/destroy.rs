//! Bulk Destroy Tests
//!
//! After destroy, no backend holds any key of the owner.

use crate::*;
use tracestore::{BackendKind, ChunkKey, OwnerId};

fn assert_owner_absent(store: &TraceStore, owner: &str) {
    let owner = OwnerId::new(owner);
    for kind in BackendKind::ALL {
        if let Ok(backend) = store.backend(kind) {
            assert!(
                backend.list_keys(&owner).unwrap().is_empty(),
                "{kind} still holds keys of {owner}"
            );
        }
    }
    assert!(store
        .engine()
        .repository()
        .list_owner(&owner)
        .unwrap()
        .is_empty());
}

#[test]
fn test_destroy_spans_every_backend() {
    let dir = tempfile::tempdir().unwrap();
    let store = full_store(dir.path());
    let trace = store.trace("job");
    trace.append(&payload(CHUNK_SIZE * 2 + 100, 1)).unwrap();

    // Chunk 0 to object, chunk 1 forced to relational, chunk 2 live
    let mut first = store.chunk("job", 0).unwrap();
    first.persist().unwrap();
    let relational = store.backend(BackendKind::Relational).unwrap();
    relational
        .write(&ChunkKey::new("job", 1), &full_chunk(1))
        .unwrap();

    let summary = store.destroy("job").unwrap();
    assert_eq!(summary.records_deleted, 3);
    assert_eq!(summary.keys_deleted[&BackendKind::Object], 1);
    assert_eq!(summary.keys_deleted[&BackendKind::Relational], 1);
    assert_eq!(summary.keys_deleted[&BackendKind::Volatile], 2);

    assert_owner_absent(&store, "job");
    assert!(!dir.path().join("artifacts/tmp/builds/6a6f62").exists());
}

#[test]
fn test_destroy_opaque_owner_with_object_backend() {
    let dir = tempfile::tempdir().unwrap();
    let store = full_store(dir.path());
    let owner = "project/7:job 42";
    let trace = store.trace(owner);
    trace.append(&payload(CHUNK_SIZE + 5, 3)).unwrap();
    store.chunk(owner, 0).unwrap().persist().unwrap();
    store.trace("bystander").append(b"keep me").unwrap();

    let summary = store.destroy(owner).unwrap();
    assert_eq!(summary.records_deleted, 2);
    assert_eq!(summary.keys_deleted[&BackendKind::Object], 1);
    assert_eq!(summary.keys_deleted[&BackendKind::Volatile], 1);

    assert_owner_absent(&store, owner);
    assert_eq!(store.trace("bystander").read().unwrap(), b"keep me");
}

#[test]
fn test_destroy_live_only_owner_with_object_backend() {
    let dir = tempfile::tempdir().unwrap();
    let store = full_store(dir.path());
    store.trace("pipeline: a/b").append(b"hello").unwrap();

    let summary = store.destroy("pipeline: a/b").unwrap();
    assert_eq!(summary.records_deleted, 1);
    assert_owner_absent(&store, "pipeline: a/b");
}

#[test]
fn test_destroy_twice_is_harmless() {
    let store = manual_store();
    store.trace("job").append(b"some output").unwrap();

    store.destroy("job").unwrap();
    let again = store.destroy("job").unwrap();

    assert_eq!(again.records_deleted, 0);
    assert_eq!(again.payloads_deleted(), 0);
    assert_owner_absent(&store, "job");
}

#[test]
fn test_two_phase_destroy_by_hand() {
    let store = manual_store();
    store.trace("job").append(&payload(CHUNK_SIZE + 1, 2)).unwrap();
    store.trace("other").append(b"keep me").unwrap();

    let engine = store.engine();
    let destroyer = engine.destroyer();
    let owner = OwnerId::new("job");

    let keys = destroyer.collect_keys(&owner).unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(engine.repository().delete_owner(&owner).unwrap(), 2);

    // Records are gone, payloads still reachable through the collected keys
    destroyer.finalize_destroy(keys).unwrap();

    assert_owner_absent(&store, "job");
    assert_eq!(store.trace("other").read().unwrap(), b"keep me");
}

#[test]
fn test_backend_delete_is_idempotent() {
    let store = manual_store();
    let key = ChunkKey::new("job", 0);
    for kind in [BackendKind::Volatile, BackendKind::Relational] {
        let backend = store.backend(kind).unwrap();
        backend.write(&key, b"x").unwrap();
        backend.delete(&key).unwrap();
        backend.delete(&key).unwrap();
        assert!(backend.size(&key).unwrap().is_none());
    }
}
