//! Cluster coordinator
//!
//! Owns N worker processes plus its own execution context (ral id 0), which
//! takes part in every table and query operation like any worker. Each
//! operation fans out to all participants and succeeds only once every one
//! of them has acknowledged.

use crate::channel::WorkerChannel;
use crate::config::ClusterConfig;
use crate::error::{DistributedError, FailureKind, Result};
use crate::fault::barrier;
use crate::protocol::{Reply, Request};
use crate::types::{ClusterId, ClusterState, ClusterStatus};
use crate::worker::{run_blocking, WorkerProcess};
use arrow::compute::concat_batches;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use sqlcluster_context::{resolve_columns, ContextFactory, ExecutionContext, Interconnect, MemoryContextFactory};
use sqlcluster_core::{ClusterMetadata, MessageId, RalId, TableReference, TokenAllocator};
use sqlcluster_partition::PartitionPlanner;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

struct WorkerHandle {
    channel: Arc<WorkerChannel>,
    task: JoinHandle<()>,
}

/// Everyone taking part in one operation, captured while the cluster is ready
struct Participants {
    local: Arc<dyn ExecutionContext>,
    workers: Vec<Arc<WorkerChannel>>,
}

/// Coordinator of one cluster
pub struct ClusterCoordinator {
    id: ClusterId,
    config: ClusterConfig,
    state: RwLock<ClusterState>,
    tokens: TokenAllocator,
    metadata: ClusterMetadata,
    planner: PartitionPlanner,
    local: RwLock<Option<Arc<dyn ExecutionContext>>>,
    workers: RwLock<Vec<WorkerHandle>>,
}

impl ClusterCoordinator {
    /// Start a cluster of `worker_count` workers using [`MemoryContext`]s.
    ///
    /// [`MemoryContext`]: sqlcluster_context::MemoryContext
    pub async fn init(worker_count: usize, config: ClusterConfig) -> Result<Self> {
        Self::init_with_factory(worker_count, config, Arc::new(MemoryContextFactory)).await
    }

    /// Start a cluster whose participants build their contexts with `factory`.
    ///
    /// Returns once every worker has acknowledged its context; if any does
    /// not, all workers are torn down and the barrier error is returned.
    pub async fn init_with_factory(
        worker_count: usize,
        config: ClusterConfig,
        factory: Arc<dyn ContextFactory>,
    ) -> Result<Self> {
        let participants = worker_count + 1;
        let metadata = ClusterMetadata::build(participants, &config.bind_ip, config.base_port)?;
        let planner = PartitionPlanner::new(participants)?;
        let interconnect =
            Interconnect::with_capacity(config.protocol.clone(), config.channel_capacity);

        let coordinator = Self {
            id: ClusterId::new(),
            config,
            state: RwLock::new(ClusterState::Uninitialized),
            tokens: TokenAllocator::new(),
            metadata,
            planner,
            local: RwLock::new(None),
            workers: RwLock::new(Vec::with_capacity(worker_count)),
        };
        tracing::info!(
            "Initializing {} with {} workers over {}",
            coordinator.id,
            worker_count,
            coordinator.config.protocol
        );
        *coordinator.state.write() = ClusterState::Initializing;

        {
            let mut workers = coordinator.workers.write();
            for index in 0..worker_count {
                let (channel, task) = WorkerProcess::spawn(
                    RalId::worker(index),
                    Arc::clone(&factory),
                    interconnect.clone(),
                    coordinator.config.channel_capacity,
                );
                workers.push(WorkerHandle {
                    channel: Arc::new(channel),
                    task,
                });
            }
        }

        let calls: Vec<_> = coordinator
            .channels()
            .into_iter()
            .map(|channel| {
                let ral_id = channel.ral_id();
                let request = Request::CreateContext {
                    ral_id,
                    cluster_metadata: coordinator.metadata.clone(),
                };
                let call = async move {
                    let reply = channel.call(request).await?;
                    expect_reply(ral_id, reply, Reply::ContextCreated)
                };
                (ral_id, call)
            })
            .collect();

        let local = factory.create(RalId::COORDINATOR, coordinator.metadata.clone(), interconnect);
        let outcome = barrier(calls, coordinator.config.operation_timeout()).await;

        let local = match (local, outcome.into_result("init")) {
            (Ok(local), Ok(_)) => local,
            (Err(e), _) => {
                coordinator.stop();
                return Err(e.into());
            }
            (_, Err(e)) => {
                coordinator.stop();
                return Err(e);
            }
        };

        *coordinator.local.write() = Some(local);
        *coordinator.state.write() = ClusterState::Ready;
        tracing::info!(
            "{} ready with {} participants",
            coordinator.id,
            coordinator.metadata.len()
        );
        Ok(coordinator)
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn state(&self) -> ClusterState {
        *self.state.read()
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn metadata(&self) -> &ClusterMetadata {
        &self.metadata
    }

    /// Number of workers, coordinator excluded
    pub fn worker_count(&self) -> usize {
        self.metadata.len() - 1
    }

    pub fn status(&self) -> ClusterStatus {
        ClusterStatus {
            id: self.id,
            state: self.state(),
            protocol: self.config.protocol.clone(),
            workers: self.worker_count(),
            participants: self.metadata.participants().to_vec(),
            tokens_issued: self.tokens.issued(),
        }
    }

    /// Split `batch` by rows across all participants and register it as `name`.
    ///
    /// Each worker's share goes into its cache first, then the worker is told
    /// to pick it up; the coordinator keeps the first share. If any worker
    /// fails, the table is dropped again wherever it was created.
    pub async fn create_table(&self, name: &str, batch: RecordBatch) -> Result<()> {
        let Participants { local, workers } = self.ready("create table")?;
        let mut parts = self.planner.split(&batch)?.into_iter();
        let local_part = parts.next().unwrap_or_else(|| batch.slice(0, 0));

        let calls: Vec<_> = workers
            .iter()
            .cloned()
            .zip(parts)
            .map(|(channel, part)| {
                let local = Arc::clone(&local);
                let (token, message_id) = self.tokens.next_message();
                let ral_id = channel.ral_id();
                let call = async move {
                    local
                        .send_to_cache(ral_id, token, message_id.clone(), &part)
                        .await?;
                    let reply = channel
                        .call(Request::CreateTable {
                            table_name: name.to_string(),
                            message_id,
                        })
                        .await?;
                    expect_reply(ral_id, reply, Reply::TableCreated)
                };
                (ral_id, call)
            })
            .collect();

        local.create_table(name, local_part)?;
        let outcome = barrier(calls, self.config.operation_timeout()).await;
        if !outcome.is_complete() {
            self.rollback_table(&local, &workers, name, &outcome.completed_ids())
                .await;
        }
        let created = outcome.into_result("create table")?;
        self.ensure_covered("create table", created.len() + 1)?;

        tracing::info!(
            "Created table '{}' ({} rows) across {} participants",
            name,
            batch.num_rows(),
            self.metadata.len()
        );
        Ok(())
    }

    /// Register a file-backed table, one slice of its sources per participant.
    ///
    /// Column metadata missing from `table` is read from its first file
    /// before slicing, so even participants with no files get the schema.
    pub async fn create_table_from_source(&self, table: TableReference) -> Result<()> {
        let Participants { local, workers } = self.ready("create table")?;
        table.validate()?;
        let table = run_blocking(move || resolve_columns(table)).await?;

        let mut slices = self.planner.plan_table(&table)?.into_iter();
        let local_slice = slices.next().ok_or_else(|| {
            DistributedError::ProtocolViolation("Partition plan produced no slices".to_string())
        })?;

        let calls: Vec<_> = workers
            .iter()
            .cloned()
            .zip(slices)
            .map(|(channel, slice)| {
                let ral_id = channel.ral_id();
                let call = async move {
                    let reply = channel
                        .call(Request::CreateTableFromSource { slice })
                        .await?;
                    expect_reply(ral_id, reply, Reply::TableCreated)
                };
                (ral_id, call)
            })
            .collect();

        let load = {
            let local = Arc::clone(&local);
            run_blocking(move || local.create_table_from_source(&local_slice))
        };
        let (loaded, outcome) =
            futures::join!(load, barrier(calls, self.config.operation_timeout()));

        let name = table.name();
        if loaded.is_err() || !outcome.is_complete() {
            self.rollback_table(&local, &workers, name, &outcome.completed_ids())
                .await;
        }
        loaded?;
        let created = outcome.into_result("create table")?;
        self.ensure_covered("create table", created.len() + 1)?;

        tracing::info!(
            "Created table '{}' from {} {} sources across {} participants",
            name,
            table.locations().len(),
            table.kind(),
            self.metadata.len()
        );
        Ok(())
    }

    /// Drop `name` on every worker, then locally
    pub async fn drop_table(&self, name: &str) -> Result<()> {
        let Participants { local, workers } = self.ready("drop table")?;
        if !local.list_tables().iter().any(|t| t == name) {
            return Err(sqlcluster_core::QueryError::TableNotFound(name.to_string()).into());
        }

        let calls: Vec<_> = workers
            .into_iter()
            .map(|channel| {
                let ral_id = channel.ral_id();
                let call = async move {
                    let reply = channel
                        .call(Request::DropTable {
                            table_name: name.to_string(),
                        })
                        .await?;
                    expect_reply(ral_id, reply, Reply::TableDropped)
                };
                (ral_id, call)
            })
            .collect();

        let outcome = barrier(calls, self.config.operation_timeout()).await;
        local.drop_table(name)?;
        outcome.into_result("drop table")?;

        tracing::info!("Dropped table '{}'", name);
        Ok(())
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.ready("list tables")?.local.list_tables())
    }

    pub fn describe_table(&self, name: &str) -> Result<Vec<(String, DataType)>> {
        Ok(self.ready("describe table")?.local.describe_table(name)?)
    }

    pub fn explain(&self, query: &str, detailed: bool) -> Result<String> {
        Ok(self.ready("explain")?.local.explain(query, detailed)?)
    }

    /// Run `query` on every participant and concatenate the partial results.
    ///
    /// Partials are concatenated in the order they complete, so row order is
    /// not stable between runs. Partitions of workers that timed out are
    /// discarded from the local cache, so their late results never pile up.
    pub async fn sql(&self, query: &str) -> Result<RecordBatch> {
        let Participants { local, workers } = self.ready("sql")?;
        let started = Instant::now();

        // The local plan is built first so that bad queries fail before dispatch
        let (local_token, _) = self.tokens.next_message();
        let handle = local.sql(query, local_token)?;

        let mut calls: Vec<(RalId, BoxFuture<'_, Result<RecordBatch>>)> =
            Vec::with_capacity(self.metadata.len());
        calls.push((
            RalId::COORDINATOR,
            async move {
                run_blocking(move || handle.result())
                    .await
                    .map_err(DistributedError::from)
            }
            .boxed(),
        ));

        let mut issued: Vec<(RalId, MessageId)> = Vec::with_capacity(workers.len());
        for channel in workers {
            let local = Arc::clone(&local);
            let (token, message_id) = self.tokens.next_message();
            let ral_id = channel.ral_id();
            issued.push((ral_id, message_id.clone()));
            let call = async move {
                let reply = channel
                    .call(Request::RunQuery {
                        correlation_token: token,
                        message_id: message_id.clone(),
                        query: query.to_string(),
                    })
                    .await?;

                match reply {
                    Reply::QueryRan {
                        correlation_token,
                        message_id: echoed,
                    } if correlation_token == token && echoed == message_id => {
                        Ok(local.pull_from_cache(message_id).await?)
                    }
                    Reply::QueryRan {
                        correlation_token,
                        message_id: echoed,
                    } => Err(DistributedError::ProtocolViolation(format!(
                        "{} answered {} ({}) to a query sent as {} ({})",
                        ral_id, echoed, correlation_token, message_id, token
                    ))),
                    other => Err(unexpected_reply(ral_id, &other, "queryRan")),
                }
            };
            calls.push((ral_id, call.boxed()));
        }

        let outcome = barrier(calls, self.config.operation_timeout()).await;
        for failure in &outcome.failures {
            if !matches!(failure.kind, FailureKind::TimedOut(_)) {
                continue;
            }
            if let Some((_, message_id)) = issued.iter().find(|(id, _)| *id == failure.ral_id) {
                if let Err(e) = local.discard_from_cache(message_id.clone()).await {
                    tracing::warn!("Could not discard {} from {}: {}", message_id, failure.ral_id, e);
                }
            }
        }
        let partials = outcome.into_result("sql")?;
        self.ensure_covered("sql", partials.len())?;

        let schema = partials
            .first()
            .map(|(_, batch)| batch.schema())
            .ok_or_else(|| {
                DistributedError::ProtocolViolation("Query produced no partial results".to_string())
            })?;
        let batches: Vec<RecordBatch> = partials.into_iter().map(|(_, batch)| batch).collect();
        let result = concat_batches(&schema, &batches)
            .map_err(sqlcluster_core::QueryError::from)?;

        tracing::info!(
            "Query completed: {} rows from {} participants in {:?}",
            result.num_rows(),
            batches.len(),
            started.elapsed()
        );
        Ok(result)
    }

    /// Kill every worker and release the local context.
    ///
    /// Not graceful: nothing in flight is awaited. Operations still waiting
    /// on a worker fail with `BarrierFailed` naming it as disconnected.
    /// Stopping an already stopped cluster does nothing.
    pub fn stop(&self) {
        {
            let mut state = self.state.write();
            if *state == ClusterState::Stopped {
                return;
            }
            *state = ClusterState::Stopped;
        }

        let workers: Vec<WorkerHandle> = std::mem::take(&mut *self.workers.write());
        let outstanding: usize = workers.iter().map(|w| w.channel.in_flight()).sum();
        if outstanding > 0 {
            tracing::warn!(
                "Stopping {} with {} worker calls outstanding",
                self.id,
                outstanding
            );
        }
        for worker in &workers {
            worker.task.abort();
        }
        self.local.write().take();

        tracing::info!("{} stopped ({} workers terminated)", self.id, workers.len());
    }

    /// Snapshot the participants of a ready cluster.
    ///
    /// The state lock is held across the snapshot, so a concurrent `stop`
    /// either happens before it (and the operation is refused) or after it
    /// (and the operation's worker calls fail as disconnected).
    fn ready(&self, operation: &'static str) -> Result<Participants> {
        let state = self.state.read();
        if *state != ClusterState::Ready {
            return Err(DistributedError::NotReady {
                operation,
                state: *state,
            });
        }
        let local = self.local.read().clone().ok_or(DistributedError::NotReady {
            operation,
            state: ClusterState::Stopped,
        })?;
        let workers = self.channels();
        drop(state);

        if workers.len() + 1 != self.metadata.len() {
            return Err(DistributedError::NotReady {
                operation,
                state: ClusterState::Stopped,
            });
        }
        Ok(Participants { local, workers })
    }

    /// Fail unless `covered` participants answered, one for every member
    fn ensure_covered(&self, operation: &str, covered: usize) -> Result<()> {
        if covered == self.metadata.len() {
            return Ok(());
        }
        Err(DistributedError::ProtocolViolation(format!(
            "{} reached {} of {} participants",
            operation,
            covered,
            self.metadata.len()
        )))
    }

    fn channels(&self) -> Vec<Arc<WorkerChannel>> {
        self.workers
            .read()
            .iter()
            .map(|w| Arc::clone(&w.channel))
            .collect()
    }

    /// Best-effort removal of a partially created table
    async fn rollback_table(
        &self,
        local: &Arc<dyn ExecutionContext>,
        workers: &[Arc<WorkerChannel>],
        name: &str,
        created: &[RalId],
    ) {
        tracing::warn!("Rolling back table '{}' on {} workers", name, created.len());
        let _ = local.drop_table(name);

        let calls: Vec<_> = workers
            .iter()
            .filter(|channel| created.contains(&channel.ral_id()))
            .map(|channel| {
                let ral_id = channel.ral_id();
                let channel = Arc::clone(channel);
                let call = async move {
                    channel
                        .call(Request::DropTable {
                            table_name: name.to_string(),
                        })
                        .await
                };
                (ral_id, call)
            })
            .collect();
        barrier(calls, self.config.operation_timeout()).await;
    }
}

impl Drop for ClusterCoordinator {
    fn drop(&mut self) {
        for worker in self.workers.get_mut().iter() {
            worker.task.abort();
        }
    }
}

fn expect_reply(ral_id: RalId, reply: Reply, expected: Reply) -> Result<()> {
    if reply == expected {
        Ok(())
    } else {
        Err(unexpected_reply(ral_id, &reply, expected.operation()))
    }
}

fn unexpected_reply(ral_id: RalId, reply: &Reply, expected: &str) -> DistributedError {
    tracing::warn!("{} answered {} where {} was expected", ral_id, reply.operation(), expected);
    DistributedError::ProtocolViolation(format!(
        "{} answered {} where {} was expected",
        ral_id,
        reply.operation(),
        expected
    ))
}
