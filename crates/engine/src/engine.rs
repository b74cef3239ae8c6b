//! Shared engine context
//!
//! [`ChunkEngine`] bundles everything a chunk operation needs: the store
//! registry, the record repository, the lease manager with its retry policy,
//! and the persist scheduler. It is built once and shared behind an `Arc`;
//! chunk and trace handles keep a clone of that `Arc`.

use crate::chunk::TraceChunk;
use crate::destroy::{BulkDestroyer, DestroySummary};
use crate::repository::{ChunkRecord, ChunkRepository};
use crate::scheduler::PersistScheduler;
use crate::trace::ChunkedTrace;
use std::sync::Arc;
use tracestore_concurrency::{acquire, LeaseGuard, LeaseManager, LeaseOptions};
use tracestore_core::{ChunkKey, OwnerId, Result};
use tracestore_storage::StoreRegistry;
use tracing::info;

/// Registry, records, leases and scheduling shared by all chunk handles
pub struct ChunkEngine {
    registry: Arc<StoreRegistry>,
    repository: Arc<dyn ChunkRepository>,
    leases: Arc<dyn LeaseManager>,
    lease_options: LeaseOptions,
    scheduler: Arc<dyn PersistScheduler>,
}

impl ChunkEngine {
    /// Assemble an engine from its collaborators
    pub fn new(
        registry: Arc<StoreRegistry>,
        repository: Arc<dyn ChunkRepository>,
        leases: Arc<dyn LeaseManager>,
        lease_options: LeaseOptions,
        scheduler: Arc<dyn PersistScheduler>,
    ) -> Self {
        Self {
            registry,
            repository,
            leases,
            lease_options,
            scheduler,
        }
    }

    /// Backend registry
    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    /// Chunk record repository
    pub fn repository(&self) -> &dyn ChunkRepository {
        self.repository.as_ref()
    }

    /// Scheduler receiving persist requests
    pub fn scheduler(&self) -> &dyn PersistScheduler {
        self.scheduler.as_ref()
    }

    /// Lease acquisition policy
    pub fn lease_options(&self) -> &LeaseOptions {
        &self.lease_options
    }

    /// Take the exclusive lease of `key`
    pub fn lease(&self, key: &ChunkKey) -> Result<LeaseGuard<'_>> {
        acquire(self.leases.as_ref(), &key.lock_key(), &self.lease_options)
    }

    /// Handle on the chunk `key`
    ///
    /// Unknown chunks get a fresh record on the initial backend; the record
    /// is saved by the first successful mutation.
    pub fn chunk(self: &Arc<Self>, key: ChunkKey) -> Result<TraceChunk> {
        Ok(match self.repository.find(&key)? {
            Some(record) => TraceChunk::stored(Arc::clone(self), record),
            None => {
                let record = ChunkRecord::new(key, self.registry.initial_backend());
                TraceChunk::unsaved(Arc::clone(self), record)
            }
        })
    }

    /// Handle on `key` only if its record exists
    pub fn find_chunk(self: &Arc<Self>, key: &ChunkKey) -> Result<Option<TraceChunk>> {
        Ok(self
            .repository
            .find(key)?
            .map(|record| TraceChunk::stored(Arc::clone(self), record)))
    }

    /// Persist the chunk `key` if it still exists
    ///
    /// Returns `false` when no record exists, which happens when the owner was
    /// destroyed between scheduling and execution.
    pub fn persist_chunk(self: &Arc<Self>, key: &ChunkKey) -> Result<bool> {
        match self.find_chunk(key)? {
            Some(mut chunk) => {
                chunk.persist()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stream view over all chunks of `owner`
    pub fn trace(self: &Arc<Self>, owner: impl Into<OwnerId>) -> ChunkedTrace {
        ChunkedTrace::new(Arc::clone(self), owner.into())
    }

    /// Two-phase bulk deleter over this engine's backends
    pub fn destroyer(&self) -> BulkDestroyer {
        BulkDestroyer::new(Arc::clone(&self.registry), Arc::clone(&self.repository))
    }

    /// Delete every chunk of `owner` from every backend
    ///
    /// Keys are collected before the records are deleted, so payloads whose
    /// record is already gone are still reclaimed.
    pub fn destroy_owner(&self, owner: &OwnerId) -> Result<DestroySummary> {
        let destroyer = self.destroyer();
        let keys = destroyer.collect_keys(owner)?;
        let records = self.repository.delete_owner(owner)?;
        let mut summary = destroyer.finalize_destroy(keys)?;
        summary.records_deleted = records;

        info!(
            owner = %owner,
            records = records,
            payloads = summary.payloads_deleted(),
            "destroyed trace"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for ChunkEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkEngine")
            .field("registry", &self.registry)
            .field("lease_options", &self.lease_options)
            .finish()
    }
}
