//! Partition cache keyed by message id

use arrow::record_batch::RecordBatch;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use sqlcluster_core::{CorrelationToken, MessageId, QueryError, RalId, Result};
use std::time::Instant;

/// One intermediate partition waiting to be pulled
#[derive(Debug, Clone)]
pub struct CachedPartition {
    /// Participant whose cache holds the partition
    pub owner: RalId,
    /// Operation the partition belongs to
    pub token: CorrelationToken,
    pub batch: RecordBatch,
    pub inserted_at: Instant,
}

/// Holds partitions addressed to one participant until they are consumed.
///
/// Each message id is written once and read once. A message id whose reader
/// gave up is discarded: any entry is evicted and a write that arrives later
/// is dropped on the floor.
#[derive(Debug)]
pub struct PartitionCache {
    owner: RalId,
    entries: DashMap<MessageId, CachedPartition>,
    abandoned: DashSet<MessageId>,
}

impl PartitionCache {
    pub fn new(owner: RalId) -> Self {
        Self {
            owner,
            entries: DashMap::new(),
            abandoned: DashSet::new(),
        }
    }

    pub fn owner(&self) -> RalId {
        self.owner
    }

    /// Store a partition under `message_id`, rejecting a second write
    pub fn put(
        &self,
        token: CorrelationToken,
        message_id: MessageId,
        batch: RecordBatch,
    ) -> Result<()> {
        if self.abandoned.remove(&message_id).is_some() {
            tracing::debug!(
                "{} dropped {} rows for abandoned {} (token {})",
                self.owner,
                batch.num_rows(),
                message_id,
                token
            );
            return Ok(());
        }

        match self.entries.entry(message_id) {
            Entry::Occupied(entry) => Err(QueryError::DuplicateMessage(entry.key().to_string())),
            Entry::Vacant(entry) => {
                tracing::debug!(
                    "{} cached {} rows under {} (token {})",
                    self.owner,
                    batch.num_rows(),
                    entry.key(),
                    token
                );
                entry.insert(CachedPartition {
                    owner: self.owner,
                    token,
                    batch,
                    inserted_at: Instant::now(),
                });
                Ok(())
            }
        }
    }

    /// Remove and return the partition stored under `message_id`
    pub fn pull(&self, message_id: &MessageId) -> Result<CachedPartition> {
        self.entries
            .remove(message_id)
            .map(|(_, partition)| partition)
            .ok_or_else(|| QueryError::CacheMiss {
                message_id: message_id.to_string(),
            })
    }

    /// Give up on `message_id`.
    ///
    /// Returns true if a partition was evicted. Otherwise the id is remembered
    /// so the write still in flight never lands.
    pub fn discard(&self, message_id: &MessageId) -> bool {
        if self.entries.remove(message_id).is_some() {
            tracing::debug!("{} evicted abandoned {}", self.owner, message_id);
            return true;
        }
        self.abandoned.insert(message_id.clone());
        false
    }

    pub fn contains(&self, message_id: &MessageId) -> bool {
        self.entries.contains_key(message_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
