//! Concurrency layer for tracestore
//!
//! This crate implements the per-chunk mutual exclusion protocol:
//! - LeaseManager: minimal acquire/release lease interface
//! - LeaseOptions: TTL plus bounded fixed-backoff retry policy
//! - LeaseGuard: scoped lease, released on drop
//! - InMemoryLeaseManager: process-local lease table

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lease;
pub mod memory;

pub use lease::{acquire, in_lock, LeaseGuard, LeaseManager, LeaseOptions, LeaseToken};
pub use memory::InMemoryLeaseManager;
