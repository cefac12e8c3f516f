//! The per-participant SQL engine seam

use crate::interconnect::Interconnect;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use sqlcluster_core::{
    ClusterMetadata, CorrelationToken, MessageId, PartitionSlice, RalId, Result,
};
use std::fmt;
use std::sync::Arc;

/// A planned query waiting to run.
///
/// Planning happens in [`ExecutionContext::sql`], so parse and binding errors
/// surface before any work is scheduled; [`QueryHandle::result`] does the
/// actual computation and may block.
pub struct QueryHandle {
    token: CorrelationToken,
    run: Box<dyn FnOnce() -> Result<RecordBatch> + Send>,
}

impl QueryHandle {
    pub fn new<F>(token: CorrelationToken, run: F) -> Self
    where
        F: FnOnce() -> Result<RecordBatch> + Send + 'static,
    {
        Self {
            token,
            run: Box::new(run),
        }
    }

    pub fn token(&self) -> CorrelationToken {
        self.token
    }

    /// Run the query to completion
    pub fn result(self) -> Result<RecordBatch> {
        (self.run)()
    }
}

impl fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// One participant's SQL engine.
///
/// Every participant holds the same table names, each over its own slice of
/// the data. Partial results move between participants only through the
/// cache operations, which go over the [`Interconnect`].
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    fn ral_id(&self) -> RalId;

    fn metadata(&self) -> &ClusterMetadata;

    /// Register `batch` under `name`, replacing any table of that name
    fn create_table(&self, name: &str, batch: RecordBatch) -> Result<()>;

    /// Load the sources of `slice` and register them under the slice's table name
    fn create_table_from_source(&self, slice: &PartitionSlice) -> Result<()>;

    fn drop_table(&self, name: &str) -> Result<()>;

    fn list_tables(&self) -> Vec<String>;

    fn describe_table(&self, name: &str) -> Result<Vec<(String, DataType)>>;

    fn explain(&self, query: &str, detailed: bool) -> Result<String>;

    /// Plan `query` against this participant's data
    fn sql(&self, query: &str, token: CorrelationToken) -> Result<QueryHandle>;

    /// Deliver `batch` into the cache of `target` under `message_id`
    async fn send_to_cache(
        &self,
        target: RalId,
        token: CorrelationToken,
        message_id: MessageId,
        batch: &RecordBatch,
    ) -> Result<()>;

    /// Take the partition cached under `message_id` from this participant's cache
    async fn pull_from_cache(&self, message_id: MessageId) -> Result<RecordBatch>;

    /// Stop waiting for `message_id`; a partition arriving later is dropped
    async fn discard_from_cache(&self, message_id: MessageId) -> Result<()>;
}

/// Builds the execution context of one participant
pub trait ContextFactory: Send + Sync {
    fn create(
        &self,
        ral_id: RalId,
        metadata: ClusterMetadata,
        interconnect: Interconnect,
    ) -> Result<Arc<dyn ExecutionContext>>;
}
