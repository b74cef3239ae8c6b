//! Core types and traits for tracestore
//!
//! This crate defines the vocabulary shared by every layer of the engine:
//! - [`OwnerId`], [`ChunkKey`]: identity of a trace and of one of its chunks
//! - [`BackendKind`]: the storage media a chunk payload can live in
//! - [`ChunkStore`]: the uniform capability set every backend implements
//! - [`Error`]: the unified error type
//! - [`checksum`]: CRC32 integrity codes for persisted payloads

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checksum;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::ChunkStore;
pub use types::{BackendKind, ChunkKey, OwnerId, CHUNK_SIZE};
