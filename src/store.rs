//! Main entry point for tracestore.
//!
//! This module provides the `TraceStore` struct, which owns the backends,
//! the chunk engine and the background persist worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracestore_concurrency::{InMemoryLeaseManager, LeaseManager, LeaseOptions};
use tracestore_core::{BackendKind, ChunkKey, ChunkStore, OwnerId, Result};
use tracestore_engine::{
    ChunkEngine, ChunkRepository, ChunkedTrace, CollectingScheduler, DestroySummary,
    EngineConfig, InMemoryChunkRepository, ObjectConfig, PersistQueue, PersistScheduler,
    PersistWorker, TraceChunk,
};
use tracestore_storage::{ObjectStore, RelationalStore, StoreRegistry, VolatileStore};
use tracing::{info, warn};

/// The trace store.
///
/// Create one with [`TraceStore::ephemeral`], [`TraceStore::open`] or
/// [`TraceStore::builder`].
///
/// # Example
///
/// ```ignore
/// use tracestore::prelude::*;
///
/// let store = TraceStore::ephemeral()?;
/// let trace = store.trace("job-42");
/// trace.append(b"$ cargo build\n")?;
///
/// // Wait for full chunks to reach durable storage
/// store.flush()?;
/// ```
pub struct TraceStore {
    engine: Arc<ChunkEngine>,
    persist: Persist,
}

enum Persist {
    Background {
        queue: Arc<PersistQueue>,
        worker: Option<PersistWorker>,
    },
    Manual(Arc<CollectingScheduler>),
}

impl TraceStore {
    /// Open a store configured by the TOML file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder()
            .config(EngineConfig::from_file(path)?)
            .open()
    }

    /// Create a store with volatile and in-memory relational backends only.
    ///
    /// Nothing touches the disk and everything is lost when the store is
    /// dropped. Meant for tests.
    pub fn ephemeral() -> Result<Self> {
        Self::builder().open()
    }

    /// Create a builder for store configuration.
    pub fn builder() -> TraceStoreBuilder {
        TraceStoreBuilder::new()
    }

    /// Handle on chunk `index` of `owner`.
    pub fn chunk(&self, owner: impl Into<OwnerId>, index: u64) -> Result<TraceChunk> {
        self.engine.chunk(ChunkKey::new(owner, index))
    }

    /// Stream view over the chunks of `owner`.
    pub fn trace(&self, owner: impl Into<OwnerId>) -> ChunkedTrace {
        self.engine.trace(owner)
    }

    /// Delete every chunk of `owner` from every backend.
    pub fn destroy(&self, owner: impl Into<OwnerId>) -> Result<DestroySummary> {
        self.engine.destroy_owner(&owner.into())
    }

    /// Wait until every persist request made so far has been handled.
    ///
    /// With manual persistence this runs the pending requests on the calling
    /// thread and returns the first failure.
    pub fn flush(&self) -> Result<()> {
        match &self.persist {
            Persist::Background { queue, .. } => {
                if !queue.flush() {
                    warn!("persist worker is not running");
                }
                Ok(())
            }
            Persist::Manual(pending) => {
                let mut first_error = None;
                for key in pending.drain() {
                    if let Err(err) = self.engine.persist_chunk(&key) {
                        warn!(chunk = %key, error = %err, "failed to persist chunk");
                        first_error.get_or_insert(err);
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
        }
    }

    /// Number of persist requests waiting, with manual persistence.
    pub fn pending_persists(&self) -> usize {
        match &self.persist {
            Persist::Background { .. } => 0,
            Persist::Manual(pending) => pending.pending(),
        }
    }

    /// Stop the persist worker after the requests already queued.
    pub fn close(mut self) {
        if let Persist::Background { worker, .. } = &mut self.persist {
            if let Some(worker) = worker.take() {
                worker.shutdown();
            }
        }
    }

    /// Backend serving `kind`.
    pub fn backend(&self, kind: BackendKind) -> Result<&Arc<dyn ChunkStore>> {
        self.engine.registry().get(kind)
    }

    /// The underlying chunk engine.
    pub fn engine(&self) -> &Arc<ChunkEngine> {
        &self.engine
    }
}

/// Builder for store configuration.
///
/// # Example
///
/// ```ignore
/// let store = TraceStore::builder()
///     .relational_path("./traces.db")
///     .object_store("./objects", "artifacts")
///     .open()?;
/// ```
pub struct TraceStoreBuilder {
    config: EngineConfig,
    lease_options: Option<LeaseOptions>,
    leases: Option<Arc<dyn LeaseManager>>,
    repository: Option<Arc<dyn ChunkRepository>>,
    background: bool,
}

impl TraceStoreBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            lease_options: None,
            leases: None,
            repository: None,
            background: true,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set backend precedence, lowest first.
    pub fn precedence(mut self, precedence: Vec<BackendKind>) -> Self {
        self.config.precedence = precedence;
        self
    }

    /// Keep relational payloads in a SQLite file instead of memory.
    pub fn relational_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.relational.enabled = true;
        self.config.relational.path = Some(path.into());
        self
    }

    /// Do not register the relational backend.
    pub fn without_relational(mut self) -> Self {
        self.config.relational.enabled = false;
        self
    }

    /// Register the object backend on `root/bucket`.
    pub fn object_store(mut self, root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        self.config.object = Some(ObjectConfig {
            root: root.into(),
            bucket: bucket.into(),
        });
        self
    }

    /// Override the lease policy from the configuration.
    pub fn lease_options(mut self, options: LeaseOptions) -> Self {
        self.lease_options = Some(options);
        self
    }

    /// Use a shared lease manager instead of a process-local one.
    pub fn lease_manager(mut self, leases: Arc<dyn LeaseManager>) -> Self {
        self.leases = Some(leases);
        self
    }

    /// Use an external chunk record repository.
    pub fn repository(mut self, repository: Arc<dyn ChunkRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Do not start the persist worker; full chunks wait for
    /// [`TraceStore::flush`].
    pub fn manual_persist(mut self) -> Self {
        self.background = false;
        self
    }

    /// Open the store.
    pub fn open(self) -> Result<TraceStore> {
        self.config.validate()?;
        let registry = Arc::new(self.build_registry()?);
        let lease_options = self
            .lease_options
            .unwrap_or_else(|| self.config.lease.into());
        let leases = self
            .leases
            .unwrap_or_else(|| Arc::new(InMemoryLeaseManager::new()) as Arc<dyn LeaseManager>);
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemoryChunkRepository::new()) as Arc<dyn ChunkRepository>);

        info!(
            precedence = ?registry.precedence(),
            background = self.background,
            "opening trace store"
        );

        if self.background {
            let (queue, receiver) = PersistQueue::new();
            let queue = Arc::new(queue);
            let engine = Arc::new(ChunkEngine::new(
                registry,
                repository,
                leases,
                lease_options,
                Arc::clone(&queue) as Arc<dyn PersistScheduler>,
            ));
            let worker = PersistWorker::spawn(Arc::clone(&engine), Arc::clone(&queue), receiver)?;
            Ok(TraceStore {
                engine,
                persist: Persist::Background {
                    queue,
                    worker: Some(worker),
                },
            })
        } else {
            let pending = Arc::new(CollectingScheduler::new());
            let engine = Arc::new(ChunkEngine::new(
                registry,
                repository,
                leases,
                lease_options,
                Arc::clone(&pending) as Arc<dyn PersistScheduler>,
            ));
            Ok(TraceStore {
                engine,
                persist: Persist::Manual(pending),
            })
        }
    }

    fn build_registry(&self) -> Result<StoreRegistry> {
        let config = &self.config;
        let mut builder = StoreRegistry::builder().precedence(config.precedence.clone());

        if config.precedence.contains(&BackendKind::Volatile) {
            builder = builder.register(Arc::new(VolatileStore::new()));
        }
        if config.relational.enabled {
            let store = match &config.relational.path {
                Some(path) => RelationalStore::open(path)?,
                None => RelationalStore::in_memory()?,
            };
            builder = builder.register(Arc::new(store));
        }
        if let Some(object) = &config.object {
            builder = builder.register(Arc::new(ObjectStore::new(&object.root, &object.bucket)));
        }

        builder.build()
    }
}

impl Default for TraceStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
