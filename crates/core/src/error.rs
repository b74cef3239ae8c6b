//! Unified error types for tracestore.
//!
//! Every layer returns [`Error`]. Caller-input errors (`InvalidOffset`,
//! `CapacityExceeded`, `PayloadTooLarge`) are surfaced immediately and never
//! retried; `LockTimeout` is the only transient kind.

use crate::types::BackendKind;
use thiserror::Error;

/// All tracestore errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Write offset lies outside `[0, size]`
    #[error("offset {offset} is out of range (chunk size is {size})")]
    InvalidOffset {
        /// Requested offset
        offset: usize,
        /// Current chunk size
        size: usize,
    },

    /// Write would grow the chunk past its fixed capacity
    #[error("chunk size overflow: {offset} + {len} exceeds {capacity} bytes")]
    CapacityExceeded {
        /// Requested offset
        offset: usize,
        /// Length of the data being written
        len: usize,
        /// Chunk capacity
        capacity: usize,
    },

    /// The chunk lease could not be obtained within the retry budget
    #[error("failed to obtain lease '{key}' after {attempts} attempts")]
    LockTimeout {
        /// Lease key
        key: String,
        /// Number of acquisition attempts made
        attempts: u32,
    },

    /// Persist was requested for a chunk that is not full
    #[error("data is not fulfilled in a bucket: {size} of {capacity} bytes")]
    NotFulfilled {
        /// Current payload length
        size: usize,
        /// Chunk capacity
        capacity: usize,
    },

    /// A backend reported an unexpected size after an append
    #[error("trace appended incorrectly: expected size {expected}, backend reports {actual}")]
    AppendMismatch {
        /// Size the engine expected
        expected: usize,
        /// Size the backend returned
        actual: usize,
    },

    /// Full overwrite with more bytes than a chunk can hold
    #[error("payload of {len} bytes exceeds chunk capacity of {capacity} bytes")]
    PayloadTooLarge {
        /// Payload length
        len: usize,
        /// Chunk capacity
        capacity: usize,
    },

    /// No suitable backend is registered or reachable
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Payload copied during persist does not match the source checksum
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum of the source payload
        expected: u32,
        /// Checksum of the payload read back from the target
        actual: u32,
    },

    /// Key cannot be represented in a backend's key scheme
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Backend I/O failure
    #[error("{backend} storage error: {message}")]
    Storage {
        /// Backend that failed
        backend: BackendKind,
        /// Backend-native error description
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for tracestore operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a storage error for `backend`
    pub fn storage(backend: BackendKind, message: impl std::fmt::Display) -> Self {
        Error::Storage {
            backend,
            message: message.to_string(),
        }
    }

    /// Check if this error is retryable.
    ///
    /// Only lease timeouts are transient; the whole operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LockTimeout { .. })
    }

    /// Check if this error was caused by invalid caller input.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidOffset { .. }
                | Error::CapacityExceeded { .. }
                | Error::PayloadTooLarge { .. }
        )
    }
}
