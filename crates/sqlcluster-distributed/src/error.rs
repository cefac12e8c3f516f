//! Error types for cluster coordination

use crate::types::ClusterState;
use sqlcluster_core::RalId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why one participant did not complete its part of a fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The participant answered with an error
    Rejected(String),
    /// No answer within the operation timeout
    TimedOut(Duration),
    /// The participant's channel went away before it answered
    Disconnected,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Rejected(reason) => write!(f, "{}", reason),
            FailureKind::TimedOut(after) => write!(f, "no response after {:?}", after),
            FailureKind::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantFailure {
    pub ral_id: RalId,
    pub kind: FailureKind,
}

impl fmt::Display for ParticipantFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ral_id, self.kind)
    }
}

fn list_failures(failures: &[ParticipantFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur while coordinating a cluster
#[derive(Error, Debug)]
pub enum DistributedError {
    /// Operation called outside the `Ready` state
    #[error("Cannot {operation}: cluster is {state}")]
    NotReady {
        operation: &'static str,
        state: ClusterState,
    },

    /// Unexpected or malformed message
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A single participant reported an error
    #[error("{ral_id} failed: {reason}")]
    ParticipantFailed { ral_id: RalId, reason: String },

    /// A fan-out did not complete on every participant
    #[error("{operation} failed on {}: {}", .failures.len(), list_failures(.failures))]
    BarrierFailed {
        operation: String,
        failures: Vec<ParticipantFailure>,
    },

    /// The message channel to a worker is gone
    #[error("Channel to {0} closed")]
    ChannelClosed(RalId),

    /// Frame encoding error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Query engine error
    #[error("Query engine error: {0}")]
    QueryError(#[from] sqlcluster_core::QueryError),
}

impl DistributedError {
    /// Ral ids named by a barrier failure
    pub fn failed_participants(&self) -> Vec<RalId> {
        match self {
            DistributedError::BarrierFailed { failures, .. } => {
                failures.iter().map(|f| f.ral_id).collect()
            }
            DistributedError::ParticipantFailed { ral_id, .. }
            | DistributedError::ChannelClosed(ral_id) => vec![*ral_id],
            _ => Vec::new(),
        }
    }
}

impl From<serde_json::Error> for DistributedError {
    fn from(err: serde_json::Error) -> Self {
        DistributedError::SerializationError(err.to_string())
    }
}

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, DistributedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barrier_failure_names_participants() {
        let err = DistributedError::BarrierFailed {
            operation: "sql".to_string(),
            failures: vec![
                ParticipantFailure {
                    ral_id: RalId(1),
                    kind: FailureKind::Disconnected,
                },
                ParticipantFailure {
                    ral_id: RalId(3),
                    kind: FailureKind::TimedOut(Duration::from_millis(50)),
                },
            ],
        };

        let message = err.to_string();
        assert!(message.starts_with("sql failed on 2:"));
        assert!(message.contains("ral-1 (disconnected)"));
        assert!(message.contains("ral-3 (no response after 50ms)"));
        assert_eq!(err.failed_participants(), vec![RalId(1), RalId(3)]);
    }

    #[test]
    fn test_not_ready_message() {
        let err = DistributedError::NotReady {
            operation: "sql",
            state: ClusterState::Stopped,
        };
        assert_eq!(err.to_string(), "Cannot sql: cluster is Stopped");
    }
}
