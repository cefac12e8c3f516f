//! Cluster membership metadata shared by every participant

use crate::error::{QueryError, Result};
use crate::ids::RalId;
use serde::{Deserialize, Serialize};

/// Network identity of one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerAddress {
    pub worker_id: String,
    pub ip: String,
    pub port: u16,
}

impl WorkerAddress {
    pub fn new(worker_id: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            worker_id: worker_id.into(),
            ip: ip.into(),
            port,
        }
    }

    /// `ip:port` form used to address the participant's cache endpoint
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Ordered membership list, index 0 being the coordinator.
///
/// Built once per cluster and handed unchanged to every participant so that
/// all execution contexts agree on the peer set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterMetadata {
    participants: Vec<WorkerAddress>,
}

impl ClusterMetadata {
    pub fn new(participants: Vec<WorkerAddress>) -> Self {
        Self { participants }
    }

    /// Build metadata for `participants` members on consecutive ports
    pub fn build(participants: usize, ip: &str, base_port: u16) -> Result<Self> {
        let participants = (0..participants)
            .map(|idx| {
                let port = u16::try_from(idx)
                    .ok()
                    .and_then(|offset| base_port.checked_add(offset))
                    .ok_or_else(|| {
                        QueryError::ConfigError(format!(
                            "Port range starting at {} cannot hold {} participants",
                            base_port, participants
                        ))
                    })?;
                Ok(WorkerAddress::new(idx.to_string(), ip, port))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { participants })
    }

    pub fn participants(&self) -> &[WorkerAddress] {
        &self.participants
    }

    pub fn get(&self, ral_id: RalId) -> Option<&WorkerAddress> {
        self.participants.get(ral_id.index())
    }

    /// Resolve a participant address, failing if the ral id is not a member
    pub fn address_of(&self, ral_id: RalId) -> Result<&WorkerAddress> {
        self.get(ral_id).ok_or_else(|| {
            QueryError::TransportError(format!(
                "{} is not a member of this cluster ({} participants)",
                ral_id,
                self.participants.len()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
