//! Backend trait shared by every storage medium
//!
//! [`ChunkStore`] is the uniform capability set for reading, writing,
//! appending, sizing and deleting chunk payloads in one physical medium.
//! Implementations live in `tracestore-storage`.

use crate::error::Result;
use crate::types::{BackendKind, ChunkKey, OwnerId};
use std::collections::BTreeSet;

/// One physical medium capable of holding chunk payloads
///
/// # Contract
///
/// - `write` is a full overwrite and fails with `PayloadTooLarge` past
///   `CHUNK_SIZE`.
/// - `append_at` keeps `payload[..offset]`, appends `data`, drops whatever
///   followed, and returns the resulting size. Offsets beyond the stored
///   payload fail with `InvalidOffset`.
/// - `delete` is idempotent: deleting an absent key is not an error.
/// - Absent keys read as `None`, never as an error.
///
/// # Thread Safety
///
/// Implementations must be safe to share across threads. Per-chunk mutual
/// exclusion is the caller's job (see the chunk lease); a backend only has
/// to keep its own structures consistent.
pub trait ChunkStore: Send + Sync {
    /// Which medium this is
    fn kind(&self) -> BackendKind;

    /// Health/capability probe used when choosing a persist target
    fn available(&self) -> bool;

    /// Full payload of a chunk, if stored here
    fn read(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>>;

    /// Overwrite the payload of a chunk
    fn write(&self, key: &ChunkKey, data: &[u8]) -> Result<()>;

    /// Write `data` at `offset`, discarding any tail; returns the new size
    fn append_at(&self, key: &ChunkKey, data: &[u8], offset: usize) -> Result<usize>;

    /// Payload length, if stored here
    fn size(&self, key: &ChunkKey) -> Result<Option<usize>>;

    /// Remove a payload
    fn delete(&self, key: &ChunkKey) -> Result<()>;

    /// Every key stored here for `owner`
    fn list_keys(&self, owner: &OwnerId) -> Result<BTreeSet<ChunkKey>>;

    /// Remove many payloads at once
    ///
    /// The default deletes one key at a time; backends with a native batch
    /// operation override it.
    fn delete_keys(&self, keys: &[ChunkKey]) -> Result<()> {
        for key in keys {
            self.delete(key)?;
        }
        Ok(())
    }
}
