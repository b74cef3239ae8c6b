//! Concurrency Tests
//!
//! Many writers on one chunk never lose updates; writers on different chunks
//! or different traces never interfere.

use crate::*;
use rand::Rng;
use std::sync::Arc;
use std::thread;

#[test]
fn test_concurrent_appends_to_one_chunk_lose_nothing() {
    let store = Arc::new(manual_store());
    let writers = 8;
    let per_writer = 50;

    let handles: Vec<_> = (0..writers)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut chunk = store.chunk("job", 0).unwrap();
                let mut offsets = Vec::new();
                for i in 0..per_writer {
                    let line = format!("writer {w} line {i:03}\n");
                    offsets.push((chunk.append_to_end(line.as_bytes()).unwrap(), line));
                }
                offsets
            })
        })
        .collect();

    let mut written: Vec<(usize, String)> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    written.sort();

    let mut chunk = store.chunk("job", 0).unwrap();
    let content = chunk.read().unwrap();
    let expected_len: usize = written.iter().map(|(_, line)| line.len()).sum();
    assert_eq!(content.len(), expected_len);

    // Every append landed exactly where it was told, back to back
    let mut cursor = 0;
    for (offset, line) in &written {
        assert_eq!(*offset, cursor);
        assert_eq!(&content[*offset..*offset + line.len()], line.as_bytes());
        cursor += line.len();
    }
}

#[test]
fn test_writers_on_different_traces() {
    let store = Arc::new(manual_store());

    let handles: Vec<_> = (0..4u8)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let trace = store.trace(format!("job-{t}"));
                let mut rng = rand::thread_rng();
                let mut expected = Vec::new();
                while expected.len() < CHUNK_SIZE + CHUNK_SIZE / 2 {
                    let piece = payload(rng.gen_range(1..20_000), t);
                    trace.append(&piece).unwrap();
                    expected.extend_from_slice(&piece);
                }
                (t, expected)
            })
        })
        .collect();

    for handle in handles {
        let (t, expected) = handle.join().unwrap();
        let trace = store.trace(format!("job-{t}"));
        assert_eq!(trace.read().unwrap(), expected);
        assert_eq!(trace.chunk_count().unwrap(), 2);
    }
}

#[test]
fn test_persist_races_with_appends_to_next_chunk() {
    init_tracing();
    let store = Arc::new(
        TraceStore::builder()
            .lease_options(patient_leases())
            .open()
            .unwrap(),
    );
    let trace = store.trace("job");
    let data = payload(CHUNK_SIZE * 4, 3);

    for piece in data.chunks(4096) {
        trace.append(piece).unwrap();
    }
    store.flush().unwrap();

    assert_eq!(trace.read().unwrap(), data);
    for chunk in trace.chunks().unwrap() {
        assert!(chunk.is_persisted(), "chunk {} still live", chunk.index());
    }
}
