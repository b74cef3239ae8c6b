//! Chunk metadata records
//!
//! A [`ChunkRecord`] is the primary data-model row for a chunk: which backend
//! holds its payload and, once durable, the payload checksum. The payload
//! bytes themselves always live in a backend.
//!
//! Records are what make a chunk addressable after its payload has moved, and
//! they are what bulk destroy reads (before deleting them) to know which
//! backend keys to reclaim.

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use tracestore_core::{BackendKind, ChunkKey, OwnerId, Result};

/// Metadata row of one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Chunk identity
    pub key: ChunkKey,
    /// Backend holding the authoritative payload
    pub backend: BackendKind,
    /// CRC32 of the payload, set when the chunk moved to a durable backend
    pub checksum: Option<u32>,
}

impl ChunkRecord {
    /// Record for a chunk that has not been written yet
    pub fn new(key: ChunkKey, backend: BackendKind) -> Self {
        Self {
            key,
            backend,
            checksum: None,
        }
    }
}

/// Primary store of chunk records
pub trait ChunkRepository: Send + Sync {
    /// Record for `key`, if the chunk exists
    fn find(&self, key: &ChunkKey) -> Result<Option<ChunkRecord>>;

    /// Insert or replace a record
    fn save(&self, record: &ChunkRecord) -> Result<()>;

    /// All records of an owner, ordered by index
    fn list_owner(&self, owner: &OwnerId) -> Result<Vec<ChunkRecord>>;

    /// Delete one record; deleting an absent record is not an error
    fn delete(&self, key: &ChunkKey) -> Result<()>;

    /// Delete all records of an owner, returning how many were removed
    fn delete_owner(&self, owner: &OwnerId) -> Result<usize>;
}

/// Record repository held in process memory, sharded by owner
#[derive(Debug, Default)]
pub struct InMemoryChunkRepository {
    owners: DashMap<OwnerId, FxHashMap<u64, ChunkRecord>>,
}

impl InMemoryChunkRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records
    pub fn len(&self) -> usize {
        self.owners.iter().map(|entry| entry.value().len()).sum()
    }

    /// Check if no record exists
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChunkRepository for InMemoryChunkRepository {
    fn find(&self, key: &ChunkKey) -> Result<Option<ChunkRecord>> {
        Ok(self
            .owners
            .get(&key.owner)
            .and_then(|records| records.get(&key.index).cloned()))
    }

    fn save(&self, record: &ChunkRecord) -> Result<()> {
        self.owners
            .entry(record.key.owner.clone())
            .or_default()
            .insert(record.key.index, record.clone());
        Ok(())
    }

    fn list_owner(&self, owner: &OwnerId) -> Result<Vec<ChunkRecord>> {
        let mut records: Vec<_> = self
            .owners
            .get(owner)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(|record| record.key.index);
        Ok(records)
    }

    fn delete(&self, key: &ChunkKey) -> Result<()> {
        if let Some(mut records) = self.owners.get_mut(&key.owner) {
            records.remove(&key.index);
        }
        self.owners.remove_if(&key.owner, |_, records| records.is_empty());
        Ok(())
    }

    fn delete_owner(&self, owner: &OwnerId) -> Result<usize> {
        Ok(self
            .owners
            .remove(owner)
            .map(|(_, records)| records.len())
            .unwrap_or(0))
    }
}
