//! Chunk Engine Integration Test Suite
//!
//! Exercises the public `TraceStore` surface end to end: chunk lifecycle,
//! persistence across backends, concurrent writers, bulk destroy and
//! randomized append/truncate sequences.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run the whole suite
//! cargo test --test chunks
//!
//! # Run persistence tests only, with engine logs
//! RUST_LOG=debug cargo test --test chunks persistence::
//! ```

use std::path::Path;
use std::sync::Once;
use std::time::Duration;

use tracestore::{LeaseOptions, TraceStore, CHUNK_SIZE};

// Test modules
pub mod concurrency;
pub mod destroy;
pub mod lifecycle;
pub mod persistence;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

static TRACING: Once = Once::new();

/// Route engine logs through the test harness writer
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Lease policy that waits long enough for heavily contended tests
pub fn patient_leases() -> LeaseOptions {
    LeaseOptions {
        ttl: Duration::from_secs(60),
        retries: 10_000,
        backoff: Duration::from_millis(1),
    }
}

/// Volatile + in-memory relational store; persistence only on `flush()`
pub fn manual_store() -> TraceStore {
    init_tracing();
    TraceStore::builder()
        .manual_persist()
        .lease_options(patient_leases())
        .open()
        .expect("Failed to open manual store")
}

/// Store with all three backends; the object bucket is created first
pub fn full_store(root: &Path) -> TraceStore {
    init_tracing();
    std::fs::create_dir_all(root.join("artifacts")).expect("Failed to create bucket");
    TraceStore::builder()
        .manual_persist()
        .lease_options(patient_leases())
        .relational_path(root.join("traces.db"))
        .object_store(root, "artifacts")
        .open()
        .expect("Failed to open full store")
}

/// Deterministic non-repeating-looking payload of `len` bytes
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// Exactly one chunk worth of data
pub fn full_chunk(seed: u8) -> Vec<u8> {
    payload(CHUNK_SIZE, seed)
}
