//! Exclusive leases serializing chunk mutations
//!
//! A lease is a time-bounded exclusive grant on a string key. Chunk mutators
//! take the lease named by `ChunkKey::lock_key()` for the whole
//! read-modify-write sequence, so at most one mutation per chunk is in flight.
//!
//! ## Acquisition
//!
//! ```text
//! attempt 1 ─ fail ─ sleep(backoff) ─ attempt 2 ─ ... ─ attempt retries+1 ─ LockTimeout
//! ```
//!
//! Waiting is bounded by `retries × backoff`; there is no unbounded blocking.
//!
//! ## Expiry
//!
//! Leases expire after their TTL so a crashed holder cannot wedge a chunk.
//! Leases are never renewed: a holder that overruns its TTL may interleave
//! with the next acquirer. Critical sections are kept to a few backend round
//! trips to stay well inside the TTL.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracestore_core::{Error, Result};
use tracing::warn;
use uuid::Uuid;

/// Default lease lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
/// Default number of retries after the first failed attempt
pub const DEFAULT_RETRIES: u32 = 10;
/// Default pause between attempts
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(10);

/// Proof of holding a lease; required to release it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseToken(Uuid);

impl LeaseToken {
    /// Fresh random token
    pub fn new() -> Self {
        LeaseToken(Uuid::new_v4())
    }
}

impl Default for LeaseToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Minimal lease service
///
/// Implementations range from an in-process table (single-process
/// deployments, tests) to a distributed lock service shared by many
/// processes. Chunk logic only ever sees this trait.
pub trait LeaseManager: Send + Sync {
    /// Grant the lease on `key` for `ttl` if nobody holds it
    fn try_acquire(&self, key: &str, ttl: Duration) -> Option<LeaseToken>;

    /// Give the lease back
    ///
    /// Returns `false` if `token` no longer holds the lease (it expired and
    /// possibly went to someone else); the current holder is left alone.
    fn release(&self, key: &str, token: &LeaseToken) -> bool;
}

/// TTL and retry policy for lease acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseOptions {
    /// Lease lifetime
    pub ttl: Duration,
    /// Retries after the first failed attempt
    pub retries: u32,
    /// Fixed pause between attempts
    pub backoff: Duration,
}

impl LeaseOptions {
    /// Total attempts made before giving up
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Upper bound on time spent waiting for the lease
    pub fn max_wait(&self) -> Duration {
        self.backoff * self.retries
    }
}

impl Default for LeaseOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            retries: DEFAULT_RETRIES,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// A held lease, released on drop
#[must_use = "the lease is released as soon as the guard is dropped"]
pub struct LeaseGuard<'a> {
    manager: &'a dyn LeaseManager,
    key: String,
    token: LeaseToken,
    acquired_at: Instant,
    ttl: Duration,
}

impl LeaseGuard<'_> {
    /// Lease key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Token proving ownership
    pub fn token(&self) -> LeaseToken {
        self.token
    }

    /// Whether the TTL has run out while the guard was held
    pub fn is_expired(&self) -> bool {
        self.acquired_at.elapsed() >= self.ttl
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if !self.manager.release(&self.key, &self.token) {
            warn!(
                key = %self.key,
                held_ms = self.acquired_at.elapsed().as_millis() as u64,
                ttl_ms = self.ttl.as_millis() as u64,
                "lease expired before release"
            );
        }
    }
}

impl fmt::Debug for LeaseGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("key", &self.key)
            .field("token", &self.token)
            .finish()
    }
}

/// Obtain the lease on `key`, retrying with a fixed backoff
///
/// # Errors
///
/// `LockTimeout` once `options.max_attempts()` attempts have failed.
pub fn acquire<'a>(
    manager: &'a dyn LeaseManager,
    key: &str,
    options: &LeaseOptions,
) -> Result<LeaseGuard<'a>> {
    let attempts = options.max_attempts();
    for attempt in 1..=attempts {
        if let Some(token) = manager.try_acquire(key, options.ttl) {
            return Ok(LeaseGuard {
                manager,
                key: key.to_string(),
                token,
                acquired_at: Instant::now(),
                ttl: options.ttl,
            });
        }
        if attempt < attempts {
            thread::sleep(options.backoff);
        }
    }

    Err(Error::LockTimeout {
        key: key.to_string(),
        attempts,
    })
}

/// Run `f` while holding the lease on `key`
pub fn in_lock<T>(
    manager: &dyn LeaseManager,
    key: &str,
    options: &LeaseOptions,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let _guard = acquire(manager, key, options)?;
    f()
}
