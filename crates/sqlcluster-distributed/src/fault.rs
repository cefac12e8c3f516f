//! Fan-out barrier with per-participant timeouts
//!
//! Every cluster operation addresses all participants at once and only
//! succeeds if each one does. The barrier waits for every participant
//! (bounded by the operation timeout) so that a failure report names all of
//! the participants that did not make it, not just the first.

use crate::error::{DistributedError, FailureKind, ParticipantFailure, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use sqlcluster_core::RalId;
use std::future::Future;
use std::time::Duration;

/// What each participant of one fan-out came back with
#[derive(Debug)]
pub struct BarrierOutcome<T> {
    /// Successful results in completion order
    pub completed: Vec<(RalId, T)>,
    /// Failures ordered by ral id
    pub failures: Vec<ParticipantFailure>,
}

impl<T> BarrierOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Ral ids that completed, in completion order
    pub fn completed_ids(&self) -> Vec<RalId> {
        self.completed.iter().map(|(id, _)| *id).collect()
    }

    /// All results, or a `BarrierFailed` naming every failed participant
    pub fn into_result(self, operation: &str) -> Result<Vec<(RalId, T)>> {
        if self.failures.is_empty() {
            Ok(self.completed)
        } else {
            Err(DistributedError::BarrierFailed {
                operation: operation.to_string(),
                failures: self.failures,
            })
        }
    }
}

/// Drive one future per participant to completion.
///
/// Each future is bounded by `timeout` on its own; `None` waits forever.
pub async fn barrier<T, F>(calls: Vec<(RalId, F)>, timeout: Option<Duration>) -> BarrierOutcome<T>
where
    F: Future<Output = Result<T>>,
{
    let mut pending: FuturesUnordered<_> = calls
        .into_iter()
        .map(|(ral_id, call)| async move {
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result.map_err(classify),
                    Err(_) => Err(FailureKind::TimedOut(limit)),
                },
                None => call.await.map_err(classify),
            };
            (ral_id, result)
        })
        .collect();

    let mut completed = Vec::new();
    let mut failures = Vec::new();
    while let Some((ral_id, result)) = pending.next().await {
        match result {
            Ok(value) => completed.push((ral_id, value)),
            Err(kind) => {
                tracing::warn!("{} did not complete: {}", ral_id, kind);
                failures.push(ParticipantFailure { ral_id, kind });
            }
        }
    }
    failures.sort_by_key(|f| f.ral_id);

    BarrierOutcome {
        completed,
        failures,
    }
}

fn classify(err: DistributedError) -> FailureKind {
    match err {
        DistributedError::ChannelClosed(_) => FailureKind::Disconnected,
        DistributedError::ParticipantFailed { reason, .. } => FailureKind::Rejected(reason),
        other => FailureKind::Rejected(other.to_string()),
    }
}
