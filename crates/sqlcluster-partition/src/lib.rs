//! Partition planning for distributed table creation
//!
//! Two ways of dividing a table among cluster participants:
//!
//! - [`slices`]: split a [`TableReference`]'s source locations (files,
//!   row groups) into ordered, disjoint [`PartitionSlice`]s.
//! - [`rows`]: split an already-resident Arrow batch into contiguous
//!   [`RowRange`]s.
//!
//! [`PartitionPlanner`] picks between them for a fixed participant count.
//! Nothing here performs I/O; malformed input fails with
//! [`QueryError::PartitionError`](sqlcluster_core::QueryError).
//!
//! [`TableReference`]: sqlcluster_core::TableReference
//! [`PartitionSlice`]: sqlcluster_core::PartitionSlice

pub mod planner;
pub mod rows;
pub mod slices;

pub use planner::PartitionPlanner;
pub use rows::{plan_row_ranges, slice_batch, split_batch, RowRange};
pub use slices::{plan_slices, plan_slices_by_worker_mapping};
