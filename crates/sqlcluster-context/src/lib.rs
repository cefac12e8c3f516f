//! Execution contexts for sqlcluster participants
//!
//! Each participant, coordinator included, owns one [`ExecutionContext`] and
//! one [`PartitionCache`]. Caches are reachable from other participants only
//! through the [`Interconnect`], which moves batches as Arrow IPC bytes.
//!
//! [`MemoryContext`] is the bundled engine: tables held as resident Arrow
//! batches and a small `SELECT` dialect (projection, conjunctive filters,
//! `LIMIT`).

pub mod cache;
pub mod context;
pub mod interconnect;
pub mod ipc;
pub mod memory;
pub mod query;
pub mod source;
pub mod sql;

pub use cache::{CachedPartition, PartitionCache};
pub use context::{ContextFactory, ExecutionContext, QueryHandle};
pub use interconnect::{CacheEndpoint, Interconnect};
pub use ipc::SerializedBatch;
pub use memory::{MemoryContext, MemoryContextFactory};
pub use source::{load_slice, resolve_columns};
pub use sql::{parse_query, SelectQuery};
