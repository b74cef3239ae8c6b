//! Storage layer for tracestore
//!
//! This crate implements the chunk backends and the registry that selects
//! between them:
//! - VolatileStore: DashMap-sharded in-process payloads for live chunks
//! - RelationalStore: SQLite rows for durable payloads
//! - ObjectStore: filesystem-backed objects for durable payloads
//! - StoreRegistry: one instance per backend kind plus precedence order

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod object;
pub mod payload;
pub mod registry;
pub mod relational;
pub mod volatile;

pub use object::ObjectStore;
pub use registry::{RegistryBuilder, StoreRegistry, DEFAULT_PRECEDENCE};
pub use relational::RelationalStore;
pub use volatile::VolatileStore;
