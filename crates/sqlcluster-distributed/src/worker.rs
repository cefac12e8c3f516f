//! Worker process: an isolated participant driven over its message channel

use crate::channel::WorkerChannel;
use crate::protocol::{decode, encode, Reply, Request};
use sqlcluster_context::{ContextFactory, ExecutionContext, Interconnect};
use sqlcluster_core::{QueryError, RalId, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One worker participant.
///
/// Owns its execution context and nothing else; the only ways in are the
/// request queue and its cache endpoint on the interconnect. Requests are
/// handled one at a time, in arrival order.
pub struct WorkerProcess {
    ral_id: Option<RalId>,
    factory: Arc<dyn ContextFactory>,
    interconnect: Interconnect,
    context: Option<Arc<dyn ExecutionContext>>,
}

impl WorkerProcess {
    pub fn new(factory: Arc<dyn ContextFactory>, interconnect: Interconnect) -> Self {
        Self {
            ral_id: None,
            factory,
            interconnect,
            context: None,
        }
    }

    /// Spawn a worker task and return the coordinator's channel to it.
    ///
    /// Aborting the returned handle kills the worker outright; calls still
    /// waiting on the channel then fail with `ChannelClosed`.
    pub fn spawn(
        ral_id: RalId,
        factory: Arc<dyn ContextFactory>,
        interconnect: Interconnect,
        capacity: usize,
    ) -> (WorkerChannel, JoinHandle<()>) {
        let capacity = capacity.max(1);
        let (request_tx, request_rx) = mpsc::channel(capacity);
        let (reply_tx, reply_rx) = mpsc::channel(capacity);

        let worker = Self::new(factory, interconnect);
        let task = tokio::spawn(worker.run(request_rx, reply_tx));

        (WorkerChannel::new(ral_id, request_tx, reply_rx), task)
    }

    /// Serve requests until the coordinator drops its end
    pub async fn run(mut self, mut requests: mpsc::Receiver<String>, replies: mpsc::Sender<String>) {
        while let Some(frame) = requests.recv().await {
            let Some(reply) = self.handle_frame(&frame).await else {
                continue;
            };
            if replies.send(reply).await.is_err() {
                break;
            }
        }
        tracing::debug!("Worker {} exiting", self.label());
    }

    /// Decode, handle and encode one frame.
    ///
    /// Returns `None` only for frames without a readable sequence number,
    /// which cannot be answered.
    pub async fn handle_frame(&mut self, frame: &str) -> Option<String> {
        let (seq, request) = match decode::<Request>(frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!("Worker {} dropping frame: {}", self.label(), e);
                return None;
            }
        };

        let reply = match request {
            Ok(request) => {
                let operation = request.operation();
                match self.handle(request).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        tracing::warn!("Worker {} failed {}: {}", self.label(), operation, e);
                        Reply::Failed {
                            reason: e.to_string(),
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Worker {}: {}", self.label(), e);
                Reply::Failed {
                    reason: e.to_string(),
                }
            }
        };

        match encode(seq, &reply) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!("Worker {} cannot encode reply: {}", self.label(), e);
                None
            }
        }
    }

    async fn handle(&mut self, request: Request) -> Result<Reply> {
        match request {
            Request::CreateContext {
                ral_id,
                cluster_metadata,
            } => {
                if let Some(existing) = self.ral_id {
                    return Err(QueryError::ExecutionError(format!(
                        "Context already created as {}",
                        existing
                    )));
                }
                let context = self.factory.create(
                    ral_id,
                    cluster_metadata,
                    self.interconnect.clone(),
                )?;
                tracing::info!("Worker {} ready", ral_id);
                self.ral_id = Some(ral_id);
                self.context = Some(context);
                Ok(Reply::ContextCreated)
            }
            Request::CreateTable {
                table_name,
                message_id,
            } => {
                let context = self.context()?;
                let batch = context.pull_from_cache(message_id).await?;
                context.create_table(&table_name, batch)?;
                Ok(Reply::TableCreated)
            }
            Request::CreateTableFromSource { slice } => {
                let context = self.context()?;
                run_blocking(move || context.create_table_from_source(&slice)).await?;
                Ok(Reply::TableCreated)
            }
            Request::DropTable { table_name } => {
                self.context()?.drop_table(&table_name)?;
                Ok(Reply::TableDropped)
            }
            Request::RunQuery {
                correlation_token,
                message_id,
                query,
            } => {
                let context = self.context()?;
                let handle = context.sql(&query, correlation_token)?;
                let batch = run_blocking(move || handle.result()).await?;

                context
                    .send_to_cache(
                        RalId::COORDINATOR,
                        correlation_token,
                        message_id.clone(),
                        &batch,
                    )
                    .await?;

                Ok(Reply::QueryRan {
                    correlation_token,
                    message_id,
                })
            }
        }
    }

    fn context(&self) -> Result<Arc<dyn ExecutionContext>> {
        self.context.clone().ok_or_else(|| {
            QueryError::ExecutionError(
                "No execution context: createBlazingContext has not been received".to_string(),
            )
        })
    }

    fn label(&self) -> String {
        self.ral_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "(no context)".to_string())
    }
}

/// Run engine work on the blocking pool so the worker's task stays responsive
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| QueryError::ExecutionError(format!("Engine task failed: {}", e)))?
}
