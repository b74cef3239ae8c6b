//! Core types for chunked trace storage
//!
//! This module defines the fundamental types used throughout the system:
//! - [`OwnerId`]: Opaque reference to the job/build that owns a trace
//! - [`ChunkKey`]: `(owner, index)` identity of a single chunk
//! - [`BackendKind`]: Storage medium holding a chunk's payload

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Fixed capacity of a single chunk, in bytes (128 KiB).
pub const CHUNK_SIZE: usize = 128 * 1024;

/// Opaque identifier of the job/build that owns a trace
///
/// The engine never interprets the value beyond using it as a namespace
/// component for storage keys and lease keys.
///
/// # Examples
///
/// ```
/// use tracestore_core::types::OwnerId;
///
/// let owner = OwnerId::new("job-42");
/// assert_eq!(owner.as_str(), "job-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create an owner id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        OwnerId(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        OwnerId::new(value)
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        OwnerId(value)
    }
}

/// Unique identity of a chunk: owning trace plus zero-based sequence number
///
/// Keys order by owner first, then by index, so a sorted set of keys reads
/// like the trace itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkKey {
    /// Owning trace
    pub owner: OwnerId,
    /// Position of the chunk within the owner's trace
    pub index: u64,
}

impl ChunkKey {
    /// Create a new chunk key
    pub fn new(owner: impl Into<OwnerId>, index: u64) -> Self {
        Self {
            owner: owner.into(),
            index,
        }
    }

    /// Byte offset of this chunk within the owner's trace stream
    pub fn start_offset(&self) -> u64 {
        self.index * CHUNK_SIZE as u64
    }

    /// Half-open stream range covered by a chunk holding `size` bytes
    pub fn range(&self, size: usize) -> Range<u64> {
        let start = self.start_offset();
        start..start + size as u64
    }

    /// Name of the exclusive lease serializing mutations of this chunk
    ///
    /// ```
    /// use tracestore_core::types::ChunkKey;
    ///
    /// let key = ChunkKey::new("job-42", 3);
    /// assert_eq!(key.lock_key(), "trace_write:job-42:chunks:3");
    /// ```
    pub fn lock_key(&self) -> String {
        format!("trace_write:{}:chunks:{}", self.owner, self.index)
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.index)
    }
}

/// Storage medium holding a chunk's authoritative payload
///
/// The enum carries no ordering. Precedence between backends is an explicit
/// list configured on the store registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process memory; cheapest to append to, lost on restart
    Volatile,
    /// Rows in a relational database
    Relational,
    /// Objects in an object store
    Object,
}

impl BackendKind {
    /// All backend kinds
    pub const ALL: [BackendKind; 3] = [
        BackendKind::Volatile,
        BackendKind::Relational,
        BackendKind::Object,
    ];

    /// Whether data in this backend survives a process restart
    ///
    /// Only durable backends are valid persist targets, and a chunk's
    /// checksum is trustworthy only while it lives in one.
    pub fn is_durable(self) -> bool {
        !matches!(self, BackendKind::Volatile)
    }

    /// Stable lowercase name, as used in configuration files
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Volatile => "volatile",
            BackendKind::Relational => "relational",
            BackendKind::Object => "object",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "volatile" => Ok(BackendKind::Volatile),
            "relational" => Ok(BackendKind::Relational),
            "object" => Ok(BackendKind::Object),
            other => Err(crate::Error::Config(format!("unknown backend '{}'", other))),
        }
    }
}
