//! Chunk engine for tracestore
//!
//! This crate ties backends, leases and records together:
//! - TraceChunk: lease-protected append/truncate/persist of one chunk
//! - ChunkedTrace: stream view splitting writes across chunks
//! - ChunkRepository: chunk metadata records
//! - PersistScheduler/PersistWorker: asynchronous migration of full chunks
//! - BulkDestroyer: two-phase deletion of a trace from every backend
//! - EngineConfig: TOML configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod config;
pub mod destroy;
pub mod engine;
pub mod repository;
pub mod scheduler;
pub mod trace;

#[cfg(test)]
mod test_util;

pub use chunk::{ChunkState, TraceChunk};
pub use config::{EngineConfig, LeaseConfig, ObjectConfig, RelationalConfig};
pub use destroy::{BulkDestroyer, CollectedKeys, DestroySummary};
pub use engine::ChunkEngine;
pub use repository::{ChunkRecord, ChunkRepository, InMemoryChunkRepository};
pub use scheduler::{
    CollectingScheduler, PersistQueue, PersistReceiver, PersistScheduler, PersistWorker,
};
pub use trace::ChunkedTrace;
