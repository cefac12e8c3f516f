//! Cache interconnect between participants
//!
//! Every participant's [`PartitionCache`] sits behind an endpoint task that
//! owns it outright. Other participants reach it only through request/ack
//! messages addressed by `ip:port`, with batches encoded as Arrow IPC, so no
//! participant ever touches another's memory.

use crate::cache::PartitionCache;
use crate::ipc::SerializedBatch;
use arrow::record_batch::RecordBatch;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sqlcluster_core::{CorrelationToken, MessageId, QueryError, RalId, Result, WorkerAddress};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Default request queue depth for one endpoint
pub const DEFAULT_ENDPOINT_CAPACITY: usize = 64;

/// Requests served by a cache endpoint
#[derive(Debug)]
pub enum CacheRpc {
    Put {
        owner: RalId,
        token: CorrelationToken,
        message_id: MessageId,
        payload: SerializedBatch,
        ack: oneshot::Sender<Result<()>>,
    },
    Pull {
        message_id: MessageId,
        reply: oneshot::Sender<Result<SerializedBatch>>,
    },
    Discard {
        message_id: MessageId,
        ack: oneshot::Sender<bool>,
    },
}

type EndpointRegistry = DashMap<String, mpsc::Sender<CacheRpc>>;

/// Registry of cache endpoints for one cluster.
///
/// Cloning shares the registry. The `protocol` string is carried for the
/// participants' benefit and is not interpreted here.
#[derive(Debug, Clone)]
pub struct Interconnect {
    protocol: Arc<str>,
    endpoints: Arc<EndpointRegistry>,
    capacity: usize,
}

impl Interconnect {
    pub fn new(protocol: impl Into<String>) -> Self {
        Self::with_capacity(protocol, DEFAULT_ENDPOINT_CAPACITY)
    }

    pub fn with_capacity(protocol: impl Into<String>, capacity: usize) -> Self {
        Self {
            protocol: Arc::from(protocol.into()),
            endpoints: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Start the cache endpoint for `ral_id` at `address`.
    ///
    /// Must be called from within a tokio runtime. The endpoint stays up
    /// until the returned guard is dropped.
    pub fn bind(&self, address: &WorkerAddress, ral_id: RalId) -> Result<CacheEndpoint> {
        let endpoint = address.endpoint();
        let (tx, rx) = mpsc::channel(self.capacity);

        match self.endpoints.entry(endpoint.clone()) {
            Entry::Occupied(_) => {
                return Err(QueryError::TransportError(format!(
                    "Cache endpoint {} is already bound",
                    endpoint
                )))
            }
            Entry::Vacant(entry) => {
                entry.insert(tx);
            }
        }

        let task = tokio::spawn(serve(PartitionCache::new(ral_id), rx));
        tracing::debug!(
            "Bound cache endpoint for {} at {} ({})",
            ral_id,
            endpoint,
            self.protocol
        );

        Ok(CacheEndpoint {
            address: endpoint,
            ral_id,
            registry: Arc::clone(&self.endpoints),
            task,
        })
    }

    pub fn is_bound(&self, address: &WorkerAddress) -> bool {
        self.endpoints.contains_key(&address.endpoint())
    }

    /// Number of endpoints currently bound
    pub fn bound_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Push `batch` into the cache of the participant at `address`
    pub async fn put(
        &self,
        address: &WorkerAddress,
        owner: RalId,
        token: CorrelationToken,
        message_id: MessageId,
        batch: &RecordBatch,
    ) -> Result<()> {
        let payload = SerializedBatch::from_batch(batch)?;
        let (ack, ack_rx) = oneshot::channel();

        self.sender(address)?
            .send(CacheRpc::Put {
                owner,
                token,
                message_id,
                payload,
                ack,
            })
            .await
            .map_err(|_| endpoint_gone(address))?;

        ack_rx.await.map_err(|_| endpoint_gone(address))?
    }

    /// Pull (and consume) a partition from the cache at `address`
    pub async fn pull(&self, address: &WorkerAddress, message_id: MessageId) -> Result<RecordBatch> {
        let (reply, reply_rx) = oneshot::channel();

        self.sender(address)?
            .send(CacheRpc::Pull { message_id, reply })
            .await
            .map_err(|_| endpoint_gone(address))?;

        reply_rx.await.map_err(|_| endpoint_gone(address))??.to_batch()
    }

    /// Abandon `message_id` at `address`, evicting it now or when it arrives.
    ///
    /// Returns true if a cached partition was evicted.
    pub async fn discard(&self, address: &WorkerAddress, message_id: MessageId) -> Result<bool> {
        let (ack, ack_rx) = oneshot::channel();

        self.sender(address)?
            .send(CacheRpc::Discard { message_id, ack })
            .await
            .map_err(|_| endpoint_gone(address))?;

        ack_rx.await.map_err(|_| endpoint_gone(address))
    }

    fn sender(&self, address: &WorkerAddress) -> Result<mpsc::Sender<CacheRpc>> {
        self.endpoints
            .get(&address.endpoint())
            .map(|tx| tx.clone())
            .ok_or_else(|| {
                QueryError::TransportError(format!(
                    "No cache endpoint bound at {}",
                    address.endpoint()
                ))
            })
    }
}

fn endpoint_gone(address: &WorkerAddress) -> QueryError {
    QueryError::TransportError(format!(
        "Cache endpoint {} went away before replying",
        address.endpoint()
    ))
}

async fn serve(cache: PartitionCache, mut requests: mpsc::Receiver<CacheRpc>) {
    while let Some(request) = requests.recv().await {
        match request {
            CacheRpc::Put {
                owner,
                token,
                message_id,
                payload,
                ack,
            } => {
                let result = if owner != cache.owner() {
                    Err(QueryError::TransportError(format!(
                        "Partition {} addressed to {} was delivered to {}",
                        message_id,
                        owner,
                        cache.owner()
                    )))
                } else {
                    payload
                        .to_batch()
                        .and_then(|batch| cache.put(token, message_id, batch))
                };
                let _ = ack.send(result);
            }
            CacheRpc::Pull { message_id, reply } => {
                let result = cache
                    .pull(&message_id)
                    .and_then(|partition| SerializedBatch::from_batch(&partition.batch));
                let _ = reply.send(result);
            }
            CacheRpc::Discard { message_id, ack } => {
                let _ = ack.send(cache.discard(&message_id));
            }
        }
    }
}

/// A bound cache endpoint; dropping it unbinds the address and stops the task
#[derive(Debug)]
pub struct CacheEndpoint {
    address: String,
    ral_id: RalId,
    registry: Arc<EndpointRegistry>,
    task: JoinHandle<()>,
}

impl CacheEndpoint {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn ral_id(&self) -> RalId {
        self.ral_id
    }
}

impl Drop for CacheEndpoint {
    fn drop(&mut self) {
        self.registry.remove(&self.address);
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};

    fn create_test_batch(values: Vec<i64>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    #[tokio::test]
    async fn test_put_and_pull_through_endpoint() {
        let interconnect = Interconnect::new("UCX");
        let address = WorkerAddress::new("1", "0.0.0.0", 4001);
        let _endpoint = interconnect.bind(&address, RalId(1)).unwrap();

        let token = CorrelationToken(3);
        let message_id = MessageId::from_token(token);
        interconnect
            .put(&address, RalId(1), token, message_id.clone(), &create_test_batch(vec![1, 2, 3]))
            .await
            .unwrap();

        let batch = interconnect.pull(&address, message_id.clone()).await.unwrap();
        assert_eq!(batch.num_rows(), 3);

        let err = interconnect.pull(&address, message_id).await.unwrap_err();
        assert!(matches!(err, QueryError::CacheMiss { .. }));
    }

    #[tokio::test]
    async fn test_discard_then_late_put_leaves_nothing() {
        let interconnect = Interconnect::new("UCX");
        let address = WorkerAddress::new("1", "0.0.0.0", 4001);
        let _endpoint = interconnect.bind(&address, RalId(1)).unwrap();

        let token = CorrelationToken(4);
        let message_id = MessageId::from_token(token);
        let evicted = interconnect.discard(&address, message_id.clone()).await.unwrap();
        assert!(!evicted);

        interconnect
            .put(&address, RalId(1), token, message_id.clone(), &create_test_batch(vec![1, 2]))
            .await
            .unwrap();

        let err = interconnect.pull(&address, message_id).await.unwrap_err();
        assert!(matches!(err, QueryError::CacheMiss { .. }));
    }

    #[tokio::test]
    async fn test_misrouted_put_rejected() {
        let interconnect = Interconnect::new("UCX");
        let address = WorkerAddress::new("2", "0.0.0.0", 4002);
        let _endpoint = interconnect.bind(&address, RalId(2)).unwrap();

        let token = CorrelationToken(1);
        let result = interconnect
            .put(&address, RalId(1), token, MessageId::from_token(token), &create_test_batch(vec![1]))
            .await;
        assert!(matches!(result, Err(QueryError::TransportError(_))));
    }

    #[tokio::test]
    async fn test_double_bind_rejected() {
        let interconnect = Interconnect::new("UCX");
        let address = WorkerAddress::new("0", "0.0.0.0", 4000);
        let _endpoint = interconnect.bind(&address, RalId(0)).unwrap();
        assert!(interconnect.bind(&address, RalId(0)).is_err());
    }

    #[tokio::test]
    async fn test_drop_unbinds() {
        let interconnect = Interconnect::new("UCX");
        let address = WorkerAddress::new("0", "0.0.0.0", 4000);
        let endpoint = interconnect.bind(&address, RalId(0)).unwrap();
        assert!(interconnect.is_bound(&address));

        drop(endpoint);
        assert!(!interconnect.is_bound(&address));

        let token = CorrelationToken(1);
        let result = interconnect
            .put(&address, RalId(0), token, MessageId::from_token(token), &create_test_batch(vec![1]))
            .await;
        assert!(matches!(result, Err(QueryError::TransportError(_))));
    }
}
