//! Store registry
//!
//! Maps each [`BackendKind`] to the one backend instance serving it and owns
//! the precedence list used to pick backends:
//!
//! - initial write target: the lowest-precedence registered backend
//! - persist target: walking precedence from the top, the first durable
//!   backend whose `available()` probe succeeds
//!
//! Precedence is an explicit list, independent of how `BackendKind` is
//! declared. The registry is built once at startup and shared by reference;
//! there is no process-wide backend cache.

use std::collections::HashMap;
use std::sync::Arc;
use tracestore_core::{BackendKind, ChunkStore, Error, Result};
use tracing::debug;

/// Default precedence, lowest first
pub const DEFAULT_PRECEDENCE: [BackendKind; 3] = [
    BackendKind::Volatile,
    BackendKind::Relational,
    BackendKind::Object,
];

/// Backend instances plus their precedence order
pub struct StoreRegistry {
    stores: HashMap<BackendKind, Arc<dyn ChunkStore>>,
    /// Registered kinds only, lowest precedence first
    precedence: Vec<BackendKind>,
}

impl StoreRegistry {
    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Backend serving `kind`
    pub fn get(&self, kind: BackendKind) -> Result<&Arc<dyn ChunkStore>> {
        self.stores
            .get(&kind)
            .ok_or_else(|| Error::BackendUnavailable(format!("{} backend is not registered", kind)))
    }

    /// Registered kinds, lowest precedence first
    pub fn precedence(&self) -> &[BackendKind] {
        &self.precedence
    }

    /// Registered backends, lowest precedence first
    pub fn stores(&self) -> impl Iterator<Item = (BackendKind, &Arc<dyn ChunkStore>)> + '_ {
        self.precedence
            .iter()
            .filter_map(move |kind| self.stores.get(kind).map(|store| (*kind, store)))
    }

    /// Position of `kind` in the precedence list
    pub fn rank(&self, kind: BackendKind) -> Option<usize> {
        self.precedence.iter().position(|k| *k == kind)
    }

    /// Backend new chunks are written to
    pub fn initial_backend(&self) -> BackendKind {
        // build() guarantees at least one registered backend
        self.precedence[0]
    }

    /// Highest-precedence durable backend that is currently reachable
    ///
    /// Never falls back to a volatile backend.
    pub fn persist_target(&self) -> Result<BackendKind> {
        for kind in self.precedence.iter().rev().copied() {
            if !kind.is_durable() {
                continue;
            }
            if self.stores[&kind].available() {
                return Ok(kind);
            }
            debug!(backend = %kind, "persist target unavailable, trying next");
        }
        Err(Error::BackendUnavailable(
            "no durable backend is available".to_string(),
        ))
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("precedence", &self.precedence)
            .finish()
    }
}

/// Builder for [`StoreRegistry`]
///
/// # Example
///
/// ```ignore
/// let registry = StoreRegistry::builder()
///     .register(Arc::new(VolatileStore::new()))
///     .register(Arc::new(RelationalStore::in_memory()?))
///     .build()?;
/// ```
pub struct RegistryBuilder {
    precedence: Vec<BackendKind>,
    stores: Vec<Arc<dyn ChunkStore>>,
}

impl RegistryBuilder {
    /// Builder with the default precedence and no backends
    pub fn new() -> Self {
        Self {
            precedence: DEFAULT_PRECEDENCE.to_vec(),
            stores: Vec::new(),
        }
    }

    /// Replace the precedence list (lowest first)
    pub fn precedence(mut self, precedence: Vec<BackendKind>) -> Self {
        self.precedence = precedence;
        self
    }

    /// Add a backend; a later registration of the same kind wins
    pub fn register(mut self, store: Arc<dyn ChunkStore>) -> Self {
        self.stores.push(store);
        self
    }

    /// Validate and build
    ///
    /// Fails if the precedence list has duplicates, if a registered backend
    /// is missing from it, or if no backend is registered.
    pub fn build(self) -> Result<StoreRegistry> {
        for (i, kind) in self.precedence.iter().enumerate() {
            if self.precedence[..i].contains(kind) {
                return Err(Error::Config(format!(
                    "backend '{}' appears twice in precedence",
                    kind
                )));
            }
        }

        let mut stores: HashMap<BackendKind, Arc<dyn ChunkStore>> = HashMap::new();
        for store in self.stores {
            let kind = store.kind();
            if !self.precedence.contains(&kind) {
                return Err(Error::Config(format!(
                    "backend '{}' is registered but has no precedence",
                    kind
                )));
            }
            stores.insert(kind, store);
        }

        let precedence: Vec<_> = self
            .precedence
            .into_iter()
            .filter(|kind| stores.contains_key(kind))
            .collect();
        if precedence.is_empty() {
            return Err(Error::Config("no backend registered".to_string()));
        }

        Ok(StoreRegistry { stores, precedence })
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
