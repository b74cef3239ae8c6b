//! Stream view over an owner's chunks
//!
//! [`ChunkedTrace`] maps trace offsets onto chunk index + in-chunk offset and
//! splits writes at chunk boundaries. Chunk `i` covers stream bytes
//! `[i * CHUNK_SIZE, (i + 1) * CHUNK_SIZE)`.
//!
//! Each chunk mutation is serialized by that chunk's lease, but a multi-chunk
//! write is not atomic as a whole. A trace is expected to have one writer.

use crate::chunk::TraceChunk;
use crate::engine::ChunkEngine;
use std::sync::Arc;
use tracestore_core::{ChunkKey, Error, OwnerId, Result, CHUNK_SIZE};
use tracing::debug;

const CHUNK_BYTES: u64 = CHUNK_SIZE as u64;

/// Ordered byte stream stored as a sequence of chunks
#[derive(Debug, Clone)]
pub struct ChunkedTrace {
    engine: Arc<ChunkEngine>,
    owner: OwnerId,
}

impl ChunkedTrace {
    pub(crate) fn new(engine: Arc<ChunkEngine>, owner: OwnerId) -> Self {
        Self { engine, owner }
    }

    /// Owning job/build
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// All existing chunks, by index
    pub fn chunks(&self) -> Result<Vec<TraceChunk>> {
        self.engine
            .repository()
            .list_owner(&self.owner)?
            .into_iter()
            .map(|record| self.engine.chunk(record.key))
            .collect()
    }

    /// Number of chunks with a record
    pub fn chunk_count(&self) -> Result<usize> {
        Ok(self.engine.repository().list_owner(&self.owner)?.len())
    }

    /// Total stream length
    pub fn size(&self) -> Result<u64> {
        match self.chunks()?.last_mut() {
            Some(last) => last.end_offset(),
            None => Ok(0),
        }
    }

    /// Whole stream contents
    pub fn read(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for mut chunk in self.chunks()? {
            out.extend_from_slice(&chunk.read()?);
        }
        Ok(out)
    }

    /// Write `data` at stream `offset`, replacing everything after it
    ///
    /// # Errors
    ///
    /// `InvalidOffset` if `offset` lies beyond the end of the stream.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let size = self.size()?;
        if offset > size {
            return Err(Error::InvalidOffset {
                offset: offset as usize,
                size: size as usize,
            });
        }
        if offset < size {
            self.truncate(offset)?;
        }

        let mut position = offset;
        let mut rest = data;
        while !rest.is_empty() {
            let index = position / CHUNK_BYTES;
            let within = (position % CHUNK_BYTES) as usize;
            let take = rest.len().min(CHUNK_SIZE - within);

            let mut chunk = self.engine.chunk(ChunkKey::new(self.owner.clone(), index))?;
            chunk.append(&rest[..take], within)?;

            position += take as u64;
            rest = &rest[take..];
        }
        Ok(())
    }

    /// Append `data` at the end, returning the offset it landed at
    pub fn append(&self, data: &[u8]) -> Result<u64> {
        let offset = self.size()?;
        self.write(offset, data)?;
        Ok(offset)
    }

    /// Shrink the stream to `offset` bytes
    ///
    /// The chunk containing `offset` is truncated; every later chunk is
    /// bulk-deleted together with its record. Truncating to 0 empties the
    /// trace.
    pub fn truncate(&self, offset: u64) -> Result<()> {
        let size = self.size()?;
        if offset > size {
            return Err(Error::InvalidOffset {
                offset: offset as usize,
                size: size as usize,
            });
        }
        if offset == size {
            return Ok(());
        }

        let index = offset / CHUNK_BYTES;
        let within = (offset % CHUNK_BYTES) as usize;

        // A cut on a chunk boundary removes that chunk entirely
        let first_removed = if within == 0 { index } else { index + 1 };

        let destroyer = self.engine.destroyer();
        let keys = destroyer.collect_keys_from(&self.owner, first_removed)?;
        for record in self.engine.repository().list_owner(&self.owner)? {
            if record.key.index >= first_removed {
                self.engine.repository().delete(&record.key)?;
            }
        }
        destroyer.finalize_destroy(keys)?;

        if within > 0 {
            let key = ChunkKey::new(self.owner.clone(), index);
            if let Some(mut chunk) = self.engine.find_chunk(&key)? {
                chunk.truncate(within)?;
            }
        }

        debug!(owner = %self.owner, offset = offset, "truncated trace");
        Ok(())
    }
}
