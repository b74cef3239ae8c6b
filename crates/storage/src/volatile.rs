//! Volatile (in-process) chunk storage
//!
//! Live chunks are appended here first. Payloads are sharded by owner:
//!
//! - DashMap: sharded by OwnerId, writers to different traces never contend
//! - FxHashMap: O(1) lookup of a chunk index within one trace
//!
//! Nothing here survives a restart, which is why full chunks are migrated to
//! a durable backend.

use crate::payload;
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use tracestore_core::{BackendKind, ChunkKey, ChunkStore, OwnerId, Result};

/// Per-owner shard holding every chunk payload of one trace
#[derive(Debug, Default)]
pub struct Shard {
    pub(crate) chunks: FxHashMap<u64, Vec<u8>>,
}

impl Shard {
    /// Number of chunks in this shard
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Check if shard is empty
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// In-memory chunk store - DashMap by owner, HashMap by index within
///
/// # Thread Safety
///
/// - read()/size(): only take a read guard on the owner's shard
/// - write()/append_at(): only lock the target owner's shard
/// - Different traces never contend
pub struct VolatileStore {
    shards: DashMap<OwnerId, Shard>,
}

impl VolatileStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            shards: DashMap::new(),
        }
    }

    /// Create with expected number of concurrent traces
    pub fn with_capacity(owners: usize) -> Self {
        Self {
            shards: DashMap::with_capacity(owners),
        }
    }

    /// Number of owners holding at least one chunk
    pub fn owner_count(&self) -> usize {
        self.shards.len()
    }

    /// Total number of chunks across all owners
    pub fn total_chunks(&self) -> usize {
        self.shards.iter().map(|entry| entry.value().len()).sum()
    }

    /// Total payload bytes held in memory
    pub fn total_bytes(&self) -> usize {
        self.shards
            .iter()
            .map(|entry| entry.value().chunks.values().map(Vec::len).sum::<usize>())
            .sum()
    }

    fn remove(&self, key: &ChunkKey) {
        let emptied = match self.shards.get_mut(&key.owner) {
            Some(mut shard) => {
                shard.chunks.remove(&key.index);
                shard.is_empty()
            }
            None => false,
        };
        if emptied {
            self.shards.remove_if(&key.owner, |_, shard| shard.is_empty());
        }
    }
}

impl Default for VolatileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VolatileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolatileStore")
            .field("owner_count", &self.owner_count())
            .field("total_chunks", &self.total_chunks())
            .finish()
    }
}

impl ChunkStore for VolatileStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Volatile
    }

    fn available(&self) -> bool {
        true
    }

    fn read(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
        Ok(self
            .shards
            .get(&key.owner)
            .and_then(|shard| shard.chunks.get(&key.index).cloned()))
    }

    fn write(&self, key: &ChunkKey, data: &[u8]) -> Result<()> {
        payload::check_capacity(data.len())?;
        self.shards
            .entry(key.owner.clone())
            .or_default()
            .chunks
            .insert(key.index, data.to_vec());
        Ok(())
    }

    fn append_at(&self, key: &ChunkKey, data: &[u8], offset: usize) -> Result<usize> {
        let mut shard = self.shards.entry(key.owner.clone()).or_default();
        let buf = shard.chunks.entry(key.index).or_default();
        let result = payload::splice(buf, data, offset);
        if result.is_err() && buf.is_empty() {
            shard.chunks.remove(&key.index);
        }
        result
    }

    fn size(&self, key: &ChunkKey) -> Result<Option<usize>> {
        Ok(self
            .shards
            .get(&key.owner)
            .and_then(|shard| shard.chunks.get(&key.index).map(Vec::len)))
    }

    fn delete(&self, key: &ChunkKey) -> Result<()> {
        self.remove(key);
        Ok(())
    }

    fn list_keys(&self, owner: &OwnerId) -> Result<BTreeSet<ChunkKey>> {
        Ok(self
            .shards
            .get(owner)
            .map(|shard| {
                shard
                    .chunks
                    .keys()
                    .map(|index| ChunkKey::new(owner.clone(), *index))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn delete_keys(&self, keys: &[ChunkKey]) -> Result<()> {
        for key in keys {
            self.remove(key);
        }
        Ok(())
    }
}
