//! Core types for cluster coordination

use serde::{Deserialize, Serialize};
use sqlcluster_core::WorkerAddress;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one cluster instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub Uuid);

impl ClusterId {
    /// Create a new random cluster ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClusterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster-{}", &self.0.to_string()[..8])
    }
}

/// Lifecycle of a cluster.
///
/// `Stopped` is terminal. Only `Ready` accepts table and query operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterState {
    Uninitialized,
    /// Workers spawned, context barrier pending
    Initializing,
    Ready,
    Stopped,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterState::Uninitialized => write!(f, "Uninitialized"),
            ClusterState::Initializing => write!(f, "Initializing"),
            ClusterState::Ready => write!(f, "Ready"),
            ClusterState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Snapshot of a cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub id: ClusterId,
    pub state: ClusterState,
    /// Interconnect protocol option
    pub protocol: String,
    /// Number of spawned workers (coordinator excluded)
    pub workers: usize,
    /// Membership, coordinator first
    pub participants: Vec<WorkerAddress>,
    /// Correlation tokens handed out so far
    pub tokens_issued: u64,
}

impl ClusterStatus {
    /// Participants including the coordinator's own context
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_id_display() {
        let id = ClusterId::new();
        let shown = id.to_string();
        assert!(shown.starts_with("cluster-"));
        assert_eq!(shown.len(), "cluster-".len() + 8);
        assert_ne!(id, ClusterId::new());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ClusterState::Ready.to_string(), "Ready");
        assert_eq!(ClusterState::Stopped.to_string(), "Stopped");
    }
}
