//! Asynchronous persistence scheduling
//!
//! A chunk that fills up asks a [`PersistScheduler`] to migrate it later;
//! the append that filled it never waits on the migration.
//!
//! Delivery is at-least-once: the same chunk may be scheduled several times
//! and `persist` is idempotent, so duplicates are harmless.
//!
//! ## Implementations
//!
//! - [`PersistQueue`] + [`PersistWorker`]: channel feeding one background
//!   thread that persists chunks in request order
//! - [`CollectingScheduler`]: holds requests until the caller drains them,
//!   for callers that trigger persistence themselves

use crate::engine::ChunkEngine;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracestore_core::{ChunkKey, Error, Result};
use tracing::{debug, error, info, warn};

/// Receives "persist this chunk later" requests
pub trait PersistScheduler: Send + Sync {
    /// Request asynchronous persistence of `key`; must not block on it
    fn schedule_persist(&self, key: ChunkKey);
}

enum Request {
    Persist(ChunkKey),
    Flush(Sender<()>),
    Shutdown,
}

/// Sending half of the persist channel
pub struct PersistQueue {
    // mpsc::Sender is not Sync on every supported toolchain
    sender: Mutex<Sender<Request>>,
}

/// Receiving half of the persist channel, consumed by [`PersistWorker::spawn`]
pub struct PersistReceiver(Receiver<Request>);

impl PersistQueue {
    /// Create a connected queue/receiver pair
    pub fn new() -> (Self, PersistReceiver) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                sender: Mutex::new(sender),
            },
            PersistReceiver(receiver),
        )
    }

    fn send(&self, request: Request) -> bool {
        self.sender.lock().send(request).is_ok()
    }

    /// Block until every request queued before this call was processed
    ///
    /// Returns `false` if the worker is gone.
    pub fn flush(&self) -> bool {
        let (ack, done) = mpsc::channel();
        self.send(Request::Flush(ack)) && done.recv().is_ok()
    }

    fn shutdown(&self) {
        self.send(Request::Shutdown);
    }
}

impl PersistScheduler for PersistQueue {
    fn schedule_persist(&self, key: ChunkKey) {
        if !self.send(Request::Persist(key.clone())) {
            warn!(chunk = %key, "persist worker is gone, request dropped");
        }
    }
}

/// Background thread draining a [`PersistQueue`]
///
/// Dropping the worker stops the thread after the requests already queued.
pub struct PersistWorker {
    queue: Arc<PersistQueue>,
    handle: Option<JoinHandle<()>>,
}

impl PersistWorker {
    /// Start the worker thread
    pub fn spawn(
        engine: Arc<ChunkEngine>,
        queue: Arc<PersistQueue>,
        receiver: PersistReceiver,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name("tracestore-persist".to_string())
            .spawn(move || run(engine, receiver))?;
        Ok(Self {
            queue,
            handle: Some(handle),
        })
    }

    /// Stop the worker and wait for it to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.queue.shutdown();
            if handle.join().is_err() {
                error!("persist worker panicked");
            }
        }
    }
}

impl Drop for PersistWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(engine: Arc<ChunkEngine>, receiver: PersistReceiver) {
    debug!("persist worker started");
    for request in receiver.0.iter() {
        match request {
            Request::Persist(key) => process(&engine, &key),
            Request::Flush(ack) => {
                let _ = ack.send(());
            }
            Request::Shutdown => break,
        }
    }
    debug!("persist worker stopped");
}

fn process(engine: &Arc<ChunkEngine>, key: &ChunkKey) {
    match engine.persist_chunk(key) {
        Ok(true) => {}
        Ok(false) => debug!(chunk = %key, "chunk vanished before persist"),
        Err(err @ Error::NotFulfilled { .. }) => {
            warn!(chunk = %key, error = %err, "skipping persist of partial chunk")
        }
        Err(err) if err.is_retryable() => {
            info!(chunk = %key, error = %err, "persist deferred, chunk is busy");
            engine.scheduler().schedule_persist(key.clone());
        }
        Err(err) => error!(chunk = %key, error = %err, "failed to persist chunk"),
    }
}

/// Scheduler that only remembers which chunks asked to be persisted
#[derive(Debug, Default)]
pub struct CollectingScheduler {
    pending: Mutex<BTreeSet<ChunkKey>>,
}

impl CollectingScheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct chunks waiting
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Take every pending request, in key order
    pub fn drain(&self) -> Vec<ChunkKey> {
        std::mem::take(&mut *self.pending.lock())
            .into_iter()
            .collect()
    }
}

impl PersistScheduler for CollectingScheduler {
    fn schedule_persist(&self, key: ChunkKey) {
        self.pending.lock().insert(key);
    }
}
