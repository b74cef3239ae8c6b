//! Chunk Lifecycle Tests
//!
//! Live → scheduled → persisted, as seen through the public store API.

use crate::*;
use tracestore::crc32;
use tracestore::{BackendKind, ChunkState, Error};

// =============================================================================
// FULL CHUNK SCENARIO
// =============================================================================

#[test]
fn test_full_chunk_stays_volatile_until_persist() {
    let store = manual_store();
    let data = full_chunk(7);

    let mut chunk = store.chunk("job-42", 0).unwrap();
    chunk.append(&data, 0).unwrap();

    assert_eq!(chunk.size().unwrap(), 131_072);
    assert_eq!(chunk.backend(), BackendKind::Volatile);
    assert_eq!(chunk.state(), ChunkState::Live);
    assert_eq!(store.pending_persists(), 1);

    chunk.persist().unwrap();

    assert!(matches!(
        chunk.backend(),
        BackendKind::Relational | BackendKind::Object
    ));
    assert_eq!(chunk.checksum(), Some(crc32(&data)));
    assert_eq!(chunk.read().unwrap(), data);
}

#[test]
fn test_checksum_is_deterministic() {
    let first = manual_store();
    let second = manual_store();

    let mut a = first.chunk("job-42", 0).unwrap();
    let mut b = second.chunk("job-42", 0).unwrap();
    a.append(&full_chunk(3), 0).unwrap();
    b.append(&full_chunk(3), 0).unwrap();
    a.persist().unwrap();
    b.persist().unwrap();

    assert_eq!(a.checksum(), b.checksum());
}

#[test]
fn test_flush_runs_pending_persists() {
    let store = manual_store();
    let mut chunk = store.chunk("job", 0).unwrap();
    chunk.append(&full_chunk(1), 0).unwrap();

    store.flush().unwrap();
    assert_eq!(store.pending_persists(), 0);

    let mut reloaded = store.chunk("job", 0).unwrap();
    assert_eq!(reloaded.backend(), BackendKind::Relational);
    assert_eq!(reloaded.read().unwrap(), full_chunk(1));
}

#[test]
fn test_background_worker_persists_full_chunks() {
    init_tracing();
    let store = TraceStore::builder()
        .lease_options(patient_leases())
        .open()
        .unwrap();

    let trace = store.trace("job");
    trace.append(&payload(CHUNK_SIZE + 10, 9)).unwrap();
    store.flush().unwrap();

    let chunks = trace.chunks().unwrap();
    assert_eq!(chunks[0].backend(), BackendKind::Relational);
    assert_eq!(chunks[1].backend(), BackendKind::Volatile);
    assert_eq!(trace.read().unwrap(), payload(CHUNK_SIZE + 10, 9));

    store.close();
}

// =============================================================================
// OFFSET VALIDATION
// =============================================================================

#[test]
fn test_caller_errors_are_not_retryable() {
    let store = manual_store();
    let mut chunk = store.chunk("job", 0).unwrap();
    chunk.append(b"abc", 0).unwrap();

    let past_end = chunk.append(b"x", 10).unwrap_err();
    let overflow = chunk.append(&full_chunk(0), 3).unwrap_err();

    for err in [past_end, overflow] {
        assert!(err.is_caller_error(), "{err}");
        assert!(!err.is_retryable(), "{err}");
    }
    assert!(matches!(
        chunk.truncate(4).unwrap_err(),
        Error::InvalidOffset { offset: 4, size: 3 }
    ));
}

#[test]
fn test_chunk_ranges_follow_index() {
    let store = manual_store();
    let mut chunk = store.chunk("job", 3).unwrap();
    chunk.append(b"0123", 0).unwrap();

    let start = 3 * CHUNK_SIZE as u64;
    assert_eq!(chunk.start_offset(), start);
    assert_eq!(chunk.range().unwrap(), start..start + 4);
    assert!(!chunk.is_full().unwrap());
}

// =============================================================================
// STREAM VIEW
// =============================================================================

#[test]
fn test_trace_reads_back_across_chunks() {
    let store = manual_store();
    let trace = store.trace("job");
    let data = payload(CHUNK_SIZE * 3 + 17, 5);

    for piece in data.chunks(10_000) {
        trace.append(piece).unwrap();
    }

    assert_eq!(trace.size().unwrap(), data.len() as u64);
    assert_eq!(trace.chunk_count().unwrap(), 4);
    assert_eq!(trace.read().unwrap(), data);

    store.flush().unwrap();
    assert_eq!(trace.read().unwrap(), data);
}

#[test]
fn test_trace_truncate_to_zero_empties_it() {
    let store = manual_store();
    let trace = store.trace("job");
    trace.append(&payload(CHUNK_SIZE + 1, 0)).unwrap();

    trace.truncate(0).unwrap();
    assert_eq!(trace.size().unwrap(), 0);
    assert_eq!(trace.chunk_count().unwrap(), 0);
}
