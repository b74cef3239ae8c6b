//! Two-phase bulk deletion
//!
//! Deleting a trace one chunk at a time would cost a lease and several round
//! trips per chunk. Instead:
//!
//! 1. [`BulkDestroyer::collect_keys`] gathers, per backend, every key that may
//!    hold a payload: keys named by records plus keys each backend lists
//!    itself. This must run before the records are deleted.
//! 2. The caller deletes the records.
//! 3. [`BulkDestroyer::finalize_destroy`] issues one batched delete per
//!    backend, with backends processed in parallel.
//!
//! A failure in one backend does not stop the others; the first error is
//! returned after all of them ran.

use crate::repository::ChunkRepository;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread;
use tracestore_core::{BackendKind, ChunkKey, OwnerId, Result};
use tracestore_storage::StoreRegistry;
use tracing::{debug, warn};

/// Keys to delete, grouped by backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedKeys {
    keys: BTreeMap<BackendKind, BTreeSet<ChunkKey>>,
}

impl CollectedKeys {
    /// Add `key` under `backend`
    pub fn insert(&mut self, backend: BackendKind, key: ChunkKey) {
        self.keys.entry(backend).or_default().insert(key);
    }

    /// Keys collected for `backend`
    pub fn get(&self, backend: BackendKind) -> Option<&BTreeSet<ChunkKey>> {
        self.keys.get(&backend)
    }

    /// Backends with at least one key
    pub fn backends(&self) -> impl Iterator<Item = BackendKind> + '_ {
        self.keys.keys().copied()
    }

    /// Total number of keys across backends
    pub fn len(&self) -> usize {
        self.keys.values().map(BTreeSet::len).sum()
    }

    /// Check if nothing was collected
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Outcome of a bulk destroy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestroySummary {
    /// Chunk records removed from the repository
    pub records_deleted: usize,
    /// Payload keys deleted, per backend
    pub keys_deleted: BTreeMap<BackendKind, usize>,
}

impl DestroySummary {
    /// Payload keys deleted across all backends
    pub fn payloads_deleted(&self) -> usize {
        self.keys_deleted.values().sum()
    }
}

/// Collects and deletes payload keys in bulk
#[derive(Clone)]
pub struct BulkDestroyer {
    registry: Arc<StoreRegistry>,
    repository: Arc<dyn ChunkRepository>,
}

impl BulkDestroyer {
    /// Destroyer over `registry`, reading records from `repository`
    pub fn new(registry: Arc<StoreRegistry>, repository: Arc<dyn ChunkRepository>) -> Self {
        Self {
            registry,
            repository,
        }
    }

    /// Every key of `owner` that may hold a payload, per backend
    pub fn collect_keys(&self, owner: &OwnerId) -> Result<CollectedKeys> {
        self.collect_keys_from(owner, 0)
    }

    /// Like [`collect_keys`](Self::collect_keys), limited to chunk indexes
    /// `>= first_index`
    pub fn collect_keys_from(&self, owner: &OwnerId, first_index: u64) -> Result<CollectedKeys> {
        let mut collected = CollectedKeys::default();

        for record in self.repository.list_owner(owner)? {
            if record.key.index >= first_index {
                collected.insert(record.backend, record.key);
            }
        }

        for (kind, store) in self.registry.stores() {
            for key in store.list_keys(owner)? {
                if key.index >= first_index {
                    collected.insert(kind, key);
                }
            }
        }

        debug!(owner = %owner, keys = collected.len(), "collected keys for destroy");
        Ok(collected)
    }

    /// Delete collected keys, one batch per backend, backends in parallel
    ///
    /// Every backend is attempted; the first failure is returned once all
    /// batches finished.
    pub fn finalize_destroy(&self, collected: CollectedKeys) -> Result<DestroySummary> {
        let registry = self.registry.as_ref();

        let results: Vec<(BackendKind, Result<usize>)> = thread::scope(|scope| {
            let handles: Vec<_> = collected
                .keys
                .into_iter()
                .map(|(kind, keys)| {
                    let handle = scope.spawn(move || -> Result<usize> {
                        let keys: Vec<ChunkKey> = keys.into_iter().collect();
                        registry.get(kind)?.delete_keys(&keys)?;
                        Ok(keys.len())
                    });
                    (kind, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(kind, handle)| match handle.join() {
                    Ok(result) => (kind, result),
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        let mut summary = DestroySummary::default();
        let mut first_error = None;
        for (kind, result) in results {
            match result {
                Ok(count) => {
                    summary.keys_deleted.insert(kind, count);
                }
                Err(err) => {
                    warn!(backend = %kind, error = %err, "bulk delete failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }
}

impl std::fmt::Debug for BulkDestroyer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkDestroyer")
            .field("registry", &self.registry)
            .finish()
    }
}
