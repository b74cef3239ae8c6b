//! # Tracestore
//!
//! Chunked, multi-backend storage for streaming build traces.
//!
//! A trace is an append-mostly byte stream owned by one job. It is stored as
//! fixed-size chunks of [`CHUNK_SIZE`] bytes. New chunks are appended in a
//! cheap volatile backend; once a chunk is full it is migrated in the
//! background to the highest-precedence durable backend that is reachable.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tracestore::prelude::*;
//!
//! let store = TraceStore::ephemeral()?;
//!
//! // Stream view: writes are split at chunk boundaries
//! let trace = store.trace("job-42");
//! trace.append(b"Running with gitlab-runner\n")?;
//! let log = trace.read()?;
//!
//! // Chunk view: one lease-protected segment
//! let mut chunk = store.chunk("job-42", 0)?;
//! let size = chunk.size()?;
//!
//! // Remove the trace from every backend
//! store.destroy("job-42")?;
//! ```
//!
//! ## Backends
//!
//! - volatile: in-process memory, where live chunks are appended
//! - relational: SQLite rows
//! - object: files under a bucket directory
//!
//! Precedence is configurable; see [`EngineConfig`].

#![warn(missing_docs)]

mod store;

pub mod prelude;

// Re-export main entry points
pub use store::{TraceStore, TraceStoreBuilder};

// Re-export error handling and core types
pub use tracestore_core::checksum::crc32;
pub use tracestore_core::{BackendKind, ChunkKey, ChunkStore, Error, OwnerId, Result, CHUNK_SIZE};

// Re-export engine types
pub use tracestore_engine::{
    ChunkRecord, ChunkRepository, ChunkState, ChunkedTrace, DestroySummary, EngineConfig,
    TraceChunk,
};

// Re-export lease types
pub use tracestore_concurrency::{LeaseManager, LeaseOptions};
