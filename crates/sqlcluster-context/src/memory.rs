//! In-memory Arrow execution context

use crate::context::{ContextFactory, ExecutionContext, QueryHandle};
use crate::interconnect::{CacheEndpoint, Interconnect};
use crate::query;
use crate::source::load_slice;
use crate::sql::parse_query;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use parking_lot::RwLock;
use sqlcluster_core::{
    ClusterMetadata, CorrelationToken, MessageId, PartitionSlice, QueryError, RalId, Result,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Execution context keeping each table as one resident [`RecordBatch`].
///
/// Binds its own cache endpoint on creation and releases it when dropped.
#[derive(Debug)]
pub struct MemoryContext {
    ral_id: RalId,
    metadata: ClusterMetadata,
    interconnect: Interconnect,
    tables: RwLock<HashMap<String, RecordBatch>>,
    endpoint: CacheEndpoint,
}

impl MemoryContext {
    /// Create the context for `ral_id` and bind its cache endpoint.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(ral_id: RalId, metadata: ClusterMetadata, interconnect: Interconnect) -> Result<Self> {
        let address = metadata.address_of(ral_id)?.clone();
        let endpoint = interconnect.bind(&address, ral_id)?;

        tracing::info!(
            "Created execution context {} at {} over {}",
            ral_id,
            endpoint.address(),
            interconnect.protocol()
        );

        Ok(Self {
            ral_id,
            metadata,
            interconnect,
            tables: RwLock::new(HashMap::new()),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.address()
    }

    /// Row count of `name`
    pub fn row_count(&self, name: &str) -> Result<usize> {
        Ok(self.table(name)?.num_rows())
    }

    fn table(&self, name: &str) -> Result<RecordBatch> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::TableNotFound(name.to_string()))
    }
}

#[async_trait]
impl ExecutionContext for MemoryContext {
    fn ral_id(&self) -> RalId {
        self.ral_id
    }

    fn metadata(&self) -> &ClusterMetadata {
        &self.metadata
    }

    fn create_table(&self, name: &str, batch: RecordBatch) -> Result<()> {
        tracing::debug!("{} registered '{}' with {} rows", self.ral_id, name, batch.num_rows());
        self.tables.write().insert(name.to_string(), batch);
        Ok(())
    }

    fn create_table_from_source(&self, slice: &PartitionSlice) -> Result<()> {
        let batch = load_slice(slice)?;
        self.create_table(slice.table.name(), batch)
    }

    fn drop_table(&self, name: &str) -> Result<()> {
        if self.tables.write().remove(name).is_none() {
            return Err(QueryError::TableNotFound(name.to_string()));
        }
        tracing::debug!("{} dropped '{}'", self.ral_id, name);
        Ok(())
    }

    fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn describe_table(&self, name: &str) -> Result<Vec<(String, DataType)>> {
        let batch = self.table(name)?;
        Ok(batch
            .schema()
            .fields()
            .iter()
            .map(|f| (f.name().clone(), f.data_type().clone()))
            .collect())
    }

    fn explain(&self, sql: &str, detailed: bool) -> Result<String> {
        let parsed = parse_query(sql)?;
        let batch = self.table(&parsed.table)?;
        query::explain(&parsed, &batch, detailed)
    }

    fn sql(&self, sql: &str, token: CorrelationToken) -> Result<QueryHandle> {
        let parsed = parse_query(sql)?;
        let batch = self.table(&parsed.table)?;
        query::output_schema(&parsed, &batch.schema())?;

        Ok(QueryHandle::new(token, move || query::execute(&parsed, &batch)))
    }

    async fn send_to_cache(
        &self,
        target: RalId,
        token: CorrelationToken,
        message_id: MessageId,
        batch: &RecordBatch,
    ) -> Result<()> {
        let address = self.metadata.address_of(target)?;
        tracing::debug!(
            "{} sending {} rows to {} as {}",
            self.ral_id,
            batch.num_rows(),
            target,
            message_id
        );
        self.interconnect
            .put(address, target, token, message_id, batch)
            .await
    }

    async fn pull_from_cache(&self, message_id: MessageId) -> Result<RecordBatch> {
        let address = self.metadata.address_of(self.ral_id)?;
        self.interconnect.pull(address, message_id).await
    }

    async fn discard_from_cache(&self, message_id: MessageId) -> Result<()> {
        let address = self.metadata.address_of(self.ral_id)?;
        self.interconnect.discard(address, message_id).await?;
        Ok(())
    }
}

/// Default factory producing [`MemoryContext`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryContextFactory;

impl ContextFactory for MemoryContextFactory {
    fn create(
        &self,
        ral_id: RalId,
        metadata: ClusterMetadata,
        interconnect: Interconnect,
    ) -> Result<Arc<dyn ExecutionContext>> {
        Ok(Arc::new(MemoryContext::new(ral_id, metadata, interconnect)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};

    fn create_test_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]));

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
            ],
        )
        .unwrap()
    }

    fn cluster(participants: usize) -> (ClusterMetadata, Interconnect) {
        (
            ClusterMetadata::build(participants, "0.0.0.0", 4000).unwrap(),
            Interconnect::new("UCX"),
        )
    }

    #[tokio::test]
    async fn test_table_lifecycle() {
        let (metadata, interconnect) = cluster(1);
        let ctx = MemoryContext::new(RalId(0), metadata, interconnect).unwrap();

        ctx.create_table("users", create_test_batch()).unwrap();
        assert_eq!(ctx.list_tables(), vec!["users".to_string()]);
        assert_eq!(ctx.row_count("users").unwrap(), 3);

        let columns = ctx.describe_table("users").unwrap();
        assert_eq!(columns[1], ("name".to_string(), DataType::Utf8));

        ctx.drop_table("users").unwrap();
        assert!(ctx.list_tables().is_empty());
        assert!(matches!(
            ctx.drop_table("users"),
            Err(QueryError::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sql_plans_eagerly() {
        let (metadata, interconnect) = cluster(1);
        let ctx = MemoryContext::new(RalId(0), metadata, interconnect).unwrap();
        ctx.create_table("users", create_test_batch()).unwrap();

        let handle = ctx
            .sql("SELECT name FROM users WHERE id > 1", CorrelationToken(9))
            .unwrap();
        assert_eq!(handle.token(), CorrelationToken(9));
        assert_eq!(handle.result().unwrap().num_rows(), 2);

        assert!(matches!(
            ctx.sql("SELECT * FROM nope", CorrelationToken(10)),
            Err(QueryError::TableNotFound(_))
        ));
        assert!(matches!(
            ctx.sql("SELECT nope FROM users", CorrelationToken(11)),
            Err(QueryError::ColumnNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cache_round_trip_between_contexts() {
        let (metadata, interconnect) = cluster(2);
        let coordinator =
            MemoryContext::new(RalId(0), metadata.clone(), interconnect.clone()).unwrap();
        let worker = MemoryContext::new(RalId(1), metadata, interconnect).unwrap();

        let token = CorrelationToken(1);
        let message_id = MessageId::from_token(token);
        worker
            .send_to_cache(RalId(0), token, message_id.clone(), &create_test_batch())
            .await
            .unwrap();

        assert!(matches!(
            worker.pull_from_cache(message_id.clone()).await,
            Err(QueryError::CacheMiss { .. })
        ));
        let batch = coordinator.pull_from_cache(message_id).await.unwrap();
        assert_eq!(batch.num_rows(), 3);
    }

    #[tokio::test]
    async fn test_context_outside_membership() {
        let (metadata, interconnect) = cluster(1);
        assert!(MemoryContext::new(RalId(3), metadata, interconnect).is_err());
    }

    #[tokio::test]
    async fn test_drop_releases_endpoint() {
        let (metadata, interconnect) = cluster(1);
        let ctx = MemoryContextFactory
            .create(RalId(0), metadata.clone(), interconnect.clone())
            .unwrap();
        assert_eq!(interconnect.bound_count(), 1);
        drop(ctx);
        assert_eq!(interconnect.bound_count(), 0);

        assert!(MemoryContext::new(RalId(0), metadata, interconnect).is_ok());
    }
}
