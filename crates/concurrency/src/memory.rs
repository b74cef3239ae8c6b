//! In-process lease table
//!
//! Suitable for single-process deployments and tests. Every lease lives in
//! one map behind a mutex; critical sections are a hash lookup and an
//! `Instant` comparison, so contention on the table itself is negligible
//! next to the backend I/O performed under the leases.
//!
//! Expired entries are not swept eagerly. A later `try_acquire` on the same
//! key simply replaces them, and `active_count` prunes on demand.

use crate::lease::{LeaseManager, LeaseToken};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Lease {
    token: LeaseToken,
    expires_at: Instant,
}

impl Lease {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Lease manager backed by a process-local table
#[derive(Debug, Default)]
pub struct InMemoryLeaseManager {
    leases: Mutex<HashMap<String, Lease>>,
}

impl InMemoryLeaseManager {
    /// Create an empty lease table
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live lease exists on `key`
    pub fn is_held(&self, key: &str) -> bool {
        let now = Instant::now();
        self.leases
            .lock()
            .get(key)
            .map(|lease| lease.is_live(now))
            .unwrap_or(false)
    }

    /// Number of live leases; expired entries are dropped
    pub fn active_count(&self) -> usize {
        let now = Instant::now();
        let mut leases = self.leases.lock();
        leases.retain(|_, lease| lease.is_live(now));
        leases.len()
    }
}

impl LeaseManager for InMemoryLeaseManager {
    fn try_acquire(&self, key: &str, ttl: Duration) -> Option<LeaseToken> {
        let now = Instant::now();
        let mut leases = self.leases.lock();

        if let Some(current) = leases.get(key) {
            if current.is_live(now) {
                return None;
            }
        }

        let token = LeaseToken::new();
        leases.insert(
            key.to_string(),
            Lease {
                token,
                expires_at: now + ttl,
            },
        );
        Some(token)
    }

    fn release(&self, key: &str, token: &LeaseToken) -> bool {
        let now = Instant::now();
        let mut leases = self.leases.lock();
        match leases.get(key).copied() {
            Some(lease) if lease.token == *token => {
                leases.remove(key);
                // Our own entry, possibly stale; report an overrun
                lease.is_live(now)
            }
            _ => false,
        }
    }
}
