//! Distributed execution for sqlcluster
//!
//! A [`ClusterCoordinator`] spawns N [`WorkerProcess`]es and keeps one
//! execution context of its own, so a cluster of N workers has N + 1
//! participants. Tables are partitioned across all of them and every query
//! runs on each participant before the partial results are concatenated on
//! the coordinator.
//!
//! Coordinator and workers talk only through the message protocol in
//! [`protocol`]; partitions and partial results travel through each
//! participant's cache over the interconnect.
//!
//! ```no_run
//! use sqlcluster_distributed::{ClusterConfig, ClusterCoordinator};
//!
//! # async fn run() -> sqlcluster_distributed::Result<()> {
//! let cluster = ClusterCoordinator::init(2, ClusterConfig::default()).await?;
//! let rows = cluster.sql("SELECT * FROM orders WHERE amount > 10").await?;
//! println!("{} rows", rows.num_rows());
//! cluster.stop();
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fault;
pub mod protocol;
pub mod types;
pub mod worker;

pub use channel::WorkerChannel;
pub use config::ClusterConfig;
pub use coordinator::ClusterCoordinator;
pub use error::{DistributedError, FailureKind, ParticipantFailure, Result};
pub use fault::{barrier, BarrierOutcome};
pub use protocol::{Reply, Request};
pub use types::{ClusterId, ClusterState, ClusterStatus};
pub use worker::WorkerProcess;
