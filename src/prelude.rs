//! Convenient imports for tracestore.
//!
//! ```ignore
//! use tracestore::prelude::*;
//!
//! let store = TraceStore::ephemeral()?;
//! store.trace("job-42").append(b"hello\n")?;
//! ```

// Main entry point
pub use crate::store::{TraceStore, TraceStoreBuilder};

// Error handling
pub use tracestore_core::{Error, Result};

// Core types
pub use tracestore_core::{BackendKind, ChunkKey, OwnerId, CHUNK_SIZE};

// Chunk and stream handles
pub use tracestore_engine::{ChunkState, ChunkedTrace, TraceChunk};
