//! Engine configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty document yields
//! a volatile + in-memory relational setup.
//!
//! ```toml
//! precedence = ["volatile", "relational", "object"]
//!
//! [lease]
//! ttl_ms = 60000
//! retries = 10
//! backoff_ms = 10
//!
//! [relational]
//! path = "/var/lib/tracestore/chunks.db"
//!
//! [object]
//! root = "/var/lib/tracestore/objects"
//! bucket = "artifacts"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracestore_concurrency::lease::{DEFAULT_BACKOFF, DEFAULT_RETRIES, DEFAULT_TTL};
use tracestore_concurrency::LeaseOptions;
use tracestore_core::{BackendKind, Error, Result};
use tracestore_storage::DEFAULT_PRECEDENCE;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Backend precedence, lowest first.
    /// Default: volatile, relational, object
    pub precedence: Vec<BackendKind>,

    /// Chunk lease policy.
    pub lease: LeaseConfig,

    /// Relational backend settings.
    pub relational: RelationalConfig,

    /// Object backend settings; no object backend when absent.
    pub object: Option<ObjectConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            precedence: DEFAULT_PRECEDENCE.to_vec(),
            lease: LeaseConfig::default(),
            relational: RelationalConfig::default(),
            object: None,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.precedence.is_empty() {
            return Err(Error::Config("precedence must not be empty".to_string()));
        }
        for (i, kind) in self.precedence.iter().enumerate() {
            if self.precedence[..i].contains(kind) {
                return Err(Error::Config(format!(
                    "backend '{}' appears twice in precedence",
                    kind
                )));
            }
        }
        if self.lease.ttl_ms == 0 {
            return Err(Error::Config("lease.ttl_ms must be positive".to_string()));
        }
        if let Some(object) = &self.object {
            if object.bucket.is_empty() {
                return Err(Error::Config("object.bucket must not be empty".to_string()));
            }
        }
        Ok(())
    }
}

/// Lease TTL and retry policy, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeaseConfig {
    /// Lease lifetime.
    /// Default: 60000
    pub ttl_ms: u64,

    /// Retries after the first failed attempt.
    /// Default: 10
    pub retries: u32,

    /// Pause between attempts.
    /// Default: 10
    pub backoff_ms: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL.as_millis() as u64,
            retries: DEFAULT_RETRIES,
            backoff_ms: DEFAULT_BACKOFF.as_millis() as u64,
        }
    }
}

impl From<LeaseConfig> for LeaseOptions {
    fn from(config: LeaseConfig) -> Self {
        LeaseOptions {
            ttl: Duration::from_millis(config.ttl_ms),
            retries: config.retries,
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

/// Relational backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelationalConfig {
    /// Register the relational backend at all.
    /// Default: true
    pub enabled: bool,

    /// SQLite database file; in-memory when absent.
    pub path: Option<PathBuf>,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Object backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectConfig {
    /// Directory containing buckets.
    pub root: PathBuf,

    /// Bucket directory name under `root`.
    pub bucket: String,
}
