use crate::engine::ChunkEngine;
use crate::repository::InMemoryChunkRepository;
use crate::scheduler::CollectingScheduler;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracestore_concurrency::{InMemoryLeaseManager, LeaseOptions};
use tracestore_core::{BackendKind, ChunkKey, ChunkStore, OwnerId, Result};
use tracestore_storage::{RelationalStore, StoreRegistry, VolatileStore};

pub(crate) struct Harness {
    pub engine: Arc<ChunkEngine>,
    pub scheduler: Arc<CollectingScheduler>,
    pub repository: Arc<InMemoryChunkRepository>,
    pub volatile: Arc<VolatileStore>,
    pub relational: Arc<RelationalStore>,
}

/// Volatile + in-memory relational backends, persist requests collected
pub(crate) fn harness() -> Harness {
    build(None)
}

/// Same as [`harness`] plus an object backend that corrupts reads
pub(crate) fn harness_with_corrupt_object() -> Harness {
    build(Some(Arc::new(CorruptStore::default())))
}

fn build(object: Option<Arc<dyn ChunkStore>>) -> Harness {
    let volatile = Arc::new(VolatileStore::new());
    let relational = Arc::new(RelationalStore::in_memory().unwrap());
    let mut builder = StoreRegistry::builder()
        .register(Arc::clone(&volatile) as Arc<dyn ChunkStore>)
        .register(Arc::clone(&relational) as Arc<dyn ChunkStore>);
    if let Some(object) = object {
        builder = builder.register(object);
    }

    let scheduler = Arc::new(CollectingScheduler::new());
    let repository = Arc::new(InMemoryChunkRepository::new());
    let engine = Arc::new(ChunkEngine::new(
        Arc::new(builder.build().unwrap()),
        Arc::clone(&repository) as _,
        Arc::new(InMemoryLeaseManager::new()),
        LeaseOptions {
            ttl: Duration::from_secs(60),
            retries: 1_000,
            backoff: Duration::from_millis(1),
        },
        Arc::clone(&scheduler) as _,
    ));

    Harness {
        engine,
        scheduler,
        repository,
        volatile,
        relational,
    }
}

/// Object-kind store whose reads come back with the first byte flipped
#[derive(Default)]
struct CorruptStore {
    inner: VolatileStore,
}

impl ChunkStore for CorruptStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Object
    }

    fn available(&self) -> bool {
        true
    }

    fn read(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read(key)?.map(|mut data| {
            if let Some(first) = data.first_mut() {
                *first ^= 0xff;
            }
            data
        }))
    }

    fn write(&self, key: &ChunkKey, data: &[u8]) -> Result<()> {
        self.inner.write(key, data)
    }

    fn append_at(&self, key: &ChunkKey, data: &[u8], offset: usize) -> Result<usize> {
        self.inner.append_at(key, data, offset)
    }

    fn size(&self, key: &ChunkKey) -> Result<Option<usize>> {
        self.inner.size(key)
    }

    fn delete(&self, key: &ChunkKey) -> Result<()> {
        self.inner.delete(key)
    }

    fn list_keys(&self, owner: &OwnerId) -> Result<BTreeSet<ChunkKey>> {
        self.inner.list_keys(owner)
    }
}
