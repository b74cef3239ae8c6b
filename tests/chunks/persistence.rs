//! Persistence Tests
//!
//! Target selection by precedence, fallback when a backend is unreachable,
//! and the no-mutation guarantee of a rejected persist.

use crate::*;
use tracestore::{BackendKind, ChunkKey, Error, OwnerId};

fn key(index: u64) -> ChunkKey {
    ChunkKey::new("job", index)
}

// =============================================================================
// TARGET SELECTION
// =============================================================================

#[test]
fn test_persist_prefers_object_backend() {
    let dir = tempfile::tempdir().unwrap();
    let store = full_store(dir.path());
    let data = full_chunk(11);

    let mut chunk = store.chunk("job", 0).unwrap();
    chunk.append(&data, 0).unwrap();
    chunk.persist().unwrap();

    assert_eq!(chunk.backend(), BackendKind::Object);
    // Owner segment is the hex of "job"
    let object = dir
        .path()
        .join("artifacts/tmp/builds/6a6f62/chunks/0.log");
    assert_eq!(std::fs::read(object).unwrap(), data);

    // Old copies are gone
    let volatile = store.backend(BackendKind::Volatile).unwrap();
    assert!(volatile.read(&key(0)).unwrap().is_none());
    let relational = store.backend(BackendKind::Relational).unwrap();
    assert!(relational.read(&key(0)).unwrap().is_none());
}

#[test]
fn test_persist_opaque_owner_to_object_backend() {
    let dir = tempfile::tempdir().unwrap();
    let store = full_store(dir.path());
    let data = full_chunk(5);

    let mut chunk = store.chunk("group/job 42", 0).unwrap();
    chunk.append(&data, 0).unwrap();
    chunk.persist().unwrap();

    assert_eq!(chunk.backend(), BackendKind::Object);
    assert_eq!(chunk.read().unwrap(), data);
    assert!(!dir.path().join("artifacts/tmp/builds/group").exists());
}

#[test]
fn test_persist_falls_back_when_bucket_missing() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = TraceStore::builder()
        .manual_persist()
        .object_store(dir.path(), "not-created")
        .open()
        .unwrap();

    let mut chunk = store.chunk("job", 0).unwrap();
    chunk.append(&full_chunk(2), 0).unwrap();
    chunk.persist().unwrap();

    assert_eq!(chunk.backend(), BackendKind::Relational);
    assert!(!dir.path().join("not-created").exists());
}

#[test]
fn test_custom_precedence_changes_target() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("artifacts")).unwrap();
    let store = TraceStore::builder()
        .manual_persist()
        .precedence(vec![
            BackendKind::Volatile,
            BackendKind::Object,
            BackendKind::Relational,
        ])
        .object_store(dir.path(), "artifacts")
        .open()
        .unwrap();

    let mut chunk = store.chunk("job", 0).unwrap();
    chunk.append(&full_chunk(4), 0).unwrap();
    chunk.persist().unwrap();

    assert_eq!(chunk.backend(), BackendKind::Relational);
}

#[test]
fn test_persist_without_durable_backend() {
    init_tracing();
    let store = TraceStore::builder()
        .manual_persist()
        .without_relational()
        .open()
        .unwrap();

    let mut chunk = store.chunk("job", 0).unwrap();
    chunk.append(&full_chunk(8), 0).unwrap();

    let err = chunk.persist().unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(_)));
    assert!(chunk.is_live());
    assert_eq!(chunk.read().unwrap(), full_chunk(8));
}

// =============================================================================
// GUARANTEES
// =============================================================================

#[test]
fn test_partial_chunk_persist_mutates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = full_store(dir.path());

    let mut chunk = store.chunk("job", 0).unwrap();
    chunk.append(&payload(1000, 1), 0).unwrap();

    let err = chunk.persist().unwrap_err();
    assert!(matches!(err, Error::NotFulfilled { size: 1000, .. }));

    assert_eq!(chunk.backend(), BackendKind::Volatile);
    assert_eq!(chunk.read().unwrap(), payload(1000, 1));
    for kind in [BackendKind::Relational, BackendKind::Object] {
        let backend = store.backend(kind).unwrap();
        assert!(backend.list_keys(&OwnerId::new("job")).unwrap().is_empty());
    }
}

#[test]
fn test_repeated_persist_is_harmless() {
    let dir = tempfile::tempdir().unwrap();
    let store = full_store(dir.path());

    let mut chunk = store.chunk("job", 0).unwrap();
    chunk.append(&full_chunk(6), 0).unwrap();
    let checksum_before = {
        chunk.persist().unwrap();
        chunk.checksum()
    };

    chunk.persist().unwrap();
    store.flush().unwrap();
    store.engine().persist_chunk(&key(0)).unwrap();

    assert_eq!(chunk.checksum(), checksum_before);
    assert_eq!(chunk.backend(), BackendKind::Object);
    assert_eq!(chunk.read().unwrap(), full_chunk(6));
}

#[test]
fn test_relational_payload_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("traces.db");

    {
        let store = TraceStore::builder()
            .manual_persist()
            .relational_path(&db)
            .open()
            .unwrap();
        let mut chunk = store.chunk("job", 0).unwrap();
        chunk.append(&full_chunk(12), 0).unwrap();
        chunk.persist().unwrap();
        store.close();
    }

    let reopened = TraceStore::builder()
        .manual_persist()
        .relational_path(&db)
        .open()
        .unwrap();
    let relational = reopened.backend(BackendKind::Relational).unwrap();
    assert_eq!(relational.read(&key(0)).unwrap(), Some(full_chunk(12)));
}

#[test]
fn test_open_from_config_file() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("bucket")).unwrap();
    let config = dir.path().join("tracestore.toml");
    std::fs::write(
        &config,
        format!(
            "[lease]\nretries = 50\nbackoff_ms = 1\n\n[object]\nroot = {:?}\nbucket = \"bucket\"\n",
            dir.path().display().to_string()
        ),
    )
    .unwrap();

    let store = TraceStore::open(&config).unwrap();
    let trace = store.trace("job");
    trace.append(&full_chunk(0)).unwrap();
    store.flush().unwrap();

    assert_eq!(trace.chunks().unwrap()[0].backend(), BackendKind::Object);
    store.close();
}
