//! Trace chunk handle
//!
//! A [`TraceChunk`] is one fixed-capacity segment of an owner's trace. Its
//! record says which backend currently holds the payload; the handle routes
//! every read and write there.
//!
//! ## Mutations
//!
//! `append`, `append_to_end`, `truncate` and `persist` run under the chunk's
//! lease. Inside the lease the handle first reloads its record and drops its
//! caches, so a decision is never taken on state another handle has already
//! changed.
//!
//! ## Lifecycle
//!
//! ```text
//! Live(volatile) ──fill to capacity──> scheduled ──persist──> Persisted(durable)
//! ```
//!
//! Persist copies the payload up the precedence order, verifies the copy,
//! switches the record, then deletes the old copy. A failure at any step
//! leaves at least one complete copy reachable.

use crate::engine::ChunkEngine;
use crate::repository::ChunkRecord;
use std::ops::Range;
use std::sync::Arc;
use tracestore_core::checksum::crc32;
use tracestore_core::{BackendKind, ChunkKey, ChunkStore, Error, OwnerId, Result, CHUNK_SIZE};
use tracing::{debug, info, warn};

/// Where a chunk's payload currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Held in the volatile backend, still accepting appends cheaply
    Live,
    /// Migrated to the given durable backend
    Persisted(BackendKind),
}

/// Handle on a single trace chunk
pub struct TraceChunk {
    engine: Arc<ChunkEngine>,
    record: ChunkRecord,
    /// Record as last read from or written to the repository
    saved: Option<ChunkRecord>,
    data: Option<Vec<u8>>,
    size: Option<usize>,
}

impl TraceChunk {
    pub(crate) fn stored(engine: Arc<ChunkEngine>, record: ChunkRecord) -> Self {
        Self {
            engine,
            saved: Some(record.clone()),
            record,
            data: None,
            size: None,
        }
    }

    pub(crate) fn unsaved(engine: Arc<ChunkEngine>, record: ChunkRecord) -> Self {
        Self {
            engine,
            record,
            saved: None,
            data: None,
            size: None,
        }
    }

    // ========================================================================
    // Identity and state
    // ========================================================================

    /// Chunk identity
    pub fn key(&self) -> &ChunkKey {
        &self.record.key
    }

    /// Owning trace
    pub fn owner(&self) -> &OwnerId {
        &self.record.key.owner
    }

    /// Position within the trace
    pub fn index(&self) -> u64 {
        self.record.key.index
    }

    /// Current metadata record
    pub fn record(&self) -> &ChunkRecord {
        &self.record
    }

    /// Backend holding the payload
    pub fn backend(&self) -> BackendKind {
        self.record.backend
    }

    /// Payload checksum, known once the chunk is durable
    pub fn checksum(&self) -> Option<u32> {
        self.record.checksum
    }

    /// Whether no record has been saved for this chunk yet
    pub fn is_new(&self) -> bool {
        self.saved.is_none()
    }

    /// Lifecycle state
    pub fn state(&self) -> ChunkState {
        if self.record.backend.is_durable() {
            ChunkState::Persisted(self.record.backend)
        } else {
            ChunkState::Live
        }
    }

    /// Payload still in the volatile backend
    pub fn is_live(&self) -> bool {
        self.state() == ChunkState::Live
    }

    /// Payload in a durable backend
    pub fn is_persisted(&self) -> bool {
        !self.is_live()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Full payload; empty if the backend holds nothing
    pub fn read(&mut self) -> Result<Vec<u8>> {
        Ok(self.load_data()?.to_vec())
    }

    /// Payload length in bytes
    pub fn size(&mut self) -> Result<usize> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        let size = match self.data.as_ref().map(Vec::len) {
            Some(size) => size,
            None => match self.store()?.size(&self.record.key)? {
                Some(size) => size,
                None => self.load_data()?.len(),
            },
        };
        self.size = Some(size);
        Ok(size)
    }

    /// Stream offset of the first byte
    pub fn start_offset(&self) -> u64 {
        self.record.key.start_offset()
    }

    /// Stream offset one past the last byte
    pub fn end_offset(&mut self) -> Result<u64> {
        Ok(self.range()?.end)
    }

    /// Stream range covered by the payload
    pub fn range(&mut self) -> Result<Range<u64>> {
        let size = self.size()?;
        Ok(self.record.key.range(size))
    }

    /// Whether the chunk holds exactly `CHUNK_SIZE` bytes
    pub fn is_full(&mut self) -> Result<bool> {
        Ok(self.size()? == CHUNK_SIZE)
    }

    /// Drop caches and re-read the record from the repository
    pub fn refresh(&mut self) -> Result<()> {
        match self.engine.repository().find(&self.record.key)? {
            Some(record) => {
                self.record = record.clone();
                self.saved = Some(record);
            }
            None if self.saved.is_some() => {
                // Destroyed underneath us; start over as a new chunk
                let initial = self.engine.registry().initial_backend();
                self.record = ChunkRecord::new(self.record.key.clone(), initial);
                self.saved = None;
            }
            None => {}
        }
        self.data = None;
        self.size = None;
        Ok(())
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Write `data` at `offset`, replacing everything from `offset` on
    ///
    /// Schedules persistence once the chunk is full.
    ///
    /// # Errors
    ///
    /// - `CapacityExceeded` if `offset + data.len()` exceeds `CHUNK_SIZE`;
    ///   checked before the lease is taken
    /// - `InvalidOffset` if `offset` lies beyond the current size
    /// - `LockTimeout` if the lease cannot be obtained
    pub fn append(&mut self, data: &[u8], offset: usize) -> Result<()> {
        check_bounds(offset, data.len())?;

        let engine = Arc::clone(&self.engine);
        {
            let _lease = engine.lease(&self.record.key)?;
            self.refresh()?;
            let size = self.size()?;
            if offset > size {
                return Err(Error::InvalidOffset { offset, size });
            }
            self.append_locked(data, offset)?;
        }

        self.schedule_if_full()
    }

    /// Append `data` after the current end, returning the offset it landed at
    ///
    /// The size is read under the lease, so concurrent callers never
    /// overwrite each other.
    pub fn append_to_end(&mut self, data: &[u8]) -> Result<usize> {
        let engine = Arc::clone(&self.engine);
        let offset = {
            let _lease = engine.lease(&self.record.key)?;
            self.refresh()?;
            let offset = self.size()?;
            check_bounds(offset, data.len())?;
            self.append_locked(data, offset)?;
            offset
        };

        self.schedule_if_full()?;
        Ok(offset)
    }

    /// Shrink the payload to `offset` bytes
    ///
    /// Truncating to the current size is a no-op. Both checks see the size
    /// as read under the lease.
    ///
    /// # Errors
    ///
    /// - `InvalidOffset` if `offset` lies beyond the current size
    /// - `LockTimeout` if the lease cannot be obtained
    pub fn truncate(&mut self, offset: usize) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let _lease = engine.lease(&self.record.key)?;
        self.refresh()?;
        let size = self.size()?;
        if offset > size {
            return Err(Error::InvalidOffset { offset, size });
        }
        if offset == size {
            return Ok(());
        }
        self.append_locked(&[], offset)
    }

    /// Move the payload to the highest-precedence available durable backend
    ///
    /// No-op if the chunk already lives at that precedence or above.
    ///
    /// # Errors
    ///
    /// - `NotFulfilled` if the chunk is not full; nothing is changed
    /// - `BackendUnavailable` if no durable backend can be reached
    /// - `ChecksumMismatch` if the copied payload does not verify; the record
    ///   keeps pointing at the old copy
    pub fn persist(&mut self) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let _lease = engine.lease(&self.record.key)?;
        self.refresh()?;
        let target = engine.registry().persist_target()?;
        self.migrate_locked(target)
    }

    /// Ask the scheduler to persist this chunk later
    ///
    /// Does nothing once the chunk is durable.
    pub fn schedule_persist(&self) {
        if self.is_persisted() {
            return;
        }
        debug!(chunk = %self.record.key, "scheduling persist");
        self.engine
            .scheduler()
            .schedule_persist(self.record.key.clone());
    }

    // ========================================================================
    // Internals (lease held)
    // ========================================================================

    fn append_locked(&mut self, data: &[u8], offset: usize) -> Result<()> {
        let expected = offset + data.len();
        let stored = self.store()?.append_at(&self.record.key, data, offset)?;
        if stored != expected {
            return Err(Error::AppendMismatch {
                expected,
                actual: stored,
            });
        }

        self.data = None;
        self.size = Some(stored);
        if self.record.backend.is_durable() {
            // Durable payloads always carry the checksum of what is stored
            let checksum = crc32(self.load_data()?);
            self.record.checksum = Some(checksum);
        }
        self.save_if_changed()?;

        debug!(
            chunk = %self.record.key,
            backend = %self.record.backend,
            offset = offset,
            len = data.len(),
            size = stored,
            "appended to chunk"
        );
        Ok(())
    }

    fn migrate_locked(&mut self, target: BackendKind) -> Result<()> {
        let current = self.record.backend;
        if !self.outranks(target, current) {
            debug!(
                chunk = %self.record.key,
                backend = %current,
                target = %target,
                "chunk already persisted"
            );
            return Ok(());
        }

        let data = self.load_data()?.to_vec();
        if data.len() != CHUNK_SIZE {
            return Err(Error::NotFulfilled {
                size: data.len(),
                capacity: CHUNK_SIZE,
            });
        }
        let checksum = crc32(&data);

        let source = self.store()?;
        let destination = Arc::clone(self.engine.registry().get(target)?);
        destination.write(&self.record.key, &data)?;

        let copied = destination.read(&self.record.key)?.unwrap_or_default();
        let actual = crc32(&copied);
        if actual != checksum {
            if let Err(err) = destination.delete(&self.record.key) {
                warn!(chunk = %self.record.key, error = %err, "failed to drop bad copy");
            }
            return Err(Error::ChecksumMismatch {
                expected: checksum,
                actual,
            });
        }

        let previous = self.record.clone();
        self.record.backend = target;
        self.record.checksum = Some(checksum);
        if let Err(err) = self.save_if_changed() {
            // The durable copy is orphaned, never the only one
            self.record = previous;
            return Err(err);
        }

        source.delete(&self.record.key)?;
        self.size = Some(data.len());
        self.data = Some(data);

        info!(
            chunk = %self.record.key,
            from = %current,
            to = %target,
            checksum = checksum,
            "persisted chunk"
        );
        Ok(())
    }

    fn outranks(&self, target: BackendKind, current: BackendKind) -> bool {
        let registry = self.engine.registry();
        match (registry.rank(target), registry.rank(current)) {
            (Some(target), Some(current)) => target > current,
            _ => target != current,
        }
    }

    fn schedule_if_full(&mut self) -> Result<()> {
        if self.is_full()? {
            self.schedule_persist();
        }
        Ok(())
    }

    fn save_if_changed(&mut self) -> Result<()> {
        if self.saved.as_ref() != Some(&self.record) {
            self.engine.repository().save(&self.record)?;
            self.saved = Some(self.record.clone());
        }
        Ok(())
    }

    fn store(&self) -> Result<Arc<dyn ChunkStore>> {
        self.engine.registry().get(self.record.backend).map(Arc::clone)
    }

    fn load_data(&mut self) -> Result<&[u8]> {
        if self.data.is_none() {
            let data = self.store()?.read(&self.record.key)?.unwrap_or_default();
            self.data = Some(data);
        }
        Ok(self.data.as_deref().unwrap_or_default())
    }
}

impl std::fmt::Debug for TraceChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceChunk")
            .field("record", &self.record)
            .field("size", &self.size)
            .finish()
    }
}

fn check_bounds(offset: usize, len: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= CHUNK_SIZE => Ok(()),
        _ => Err(Error::CapacityExceeded {
            offset,
            len,
            capacity: CHUNK_SIZE,
        }),
    }
}
