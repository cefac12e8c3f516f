//! Coordinator side of one worker's message channel

use crate::error::{DistributedError, Result};
use crate::protocol::{decode, encode, Reply, Request};
use dashmap::DashMap;
use sqlcluster_core::RalId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

type PendingReplies = DashMap<u64, oneshot::Sender<Result<Reply>>>;

/// Request/reply channel to one worker.
///
/// Any number of calls may be in flight at once; a dispatcher task routes
/// each reply to its caller by sequence number. When the worker goes away
/// the dispatcher fails every outstanding call with `ChannelClosed`.
#[derive(Debug)]
pub struct WorkerChannel {
    ral_id: RalId,
    requests: mpsc::Sender<String>,
    pending: Arc<PendingReplies>,
    next_seq: AtomicU64,
}

impl WorkerChannel {
    /// Wrap the coordinator ends of a worker's queues and start the dispatcher
    pub fn new(ral_id: RalId, requests: mpsc::Sender<String>, replies: mpsc::Receiver<String>) -> Self {
        let pending = Arc::new(PendingReplies::new());
        tokio::spawn(dispatch(ral_id, replies, Arc::clone(&pending)));

        Self {
            ral_id,
            requests,
            pending,
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn ral_id(&self) -> RalId {
        self.ral_id
    }

    /// Calls awaiting a reply
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Send `request` and wait for the worker's reply.
    ///
    /// A `failed` reply comes back as `ParticipantFailed`.
    pub async fn call(&self, request: Request) -> Result<Reply> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let frame = encode(seq, &request)?;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);

        tracing::debug!("-> {} #{} {}", self.ral_id, seq, request.operation());
        if self.requests.send(frame).await.is_err() {
            self.pending.remove(&seq);
            return Err(DistributedError::ChannelClosed(self.ral_id));
        }

        match rx.await {
            Ok(Ok(Reply::Failed { reason })) => Err(DistributedError::ParticipantFailed {
                ral_id: self.ral_id,
                reason,
            }),
            Ok(reply) => reply,
            Err(_) => Err(DistributedError::ChannelClosed(self.ral_id)),
        }
    }
}

async fn dispatch(ral_id: RalId, mut replies: mpsc::Receiver<String>, pending: Arc<PendingReplies>) {
    while let Some(frame) = replies.recv().await {
        let (seq, reply) = match decode::<Reply>(&frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!("Dropping frame from {}: {}", ral_id, e);
                continue;
            }
        };

        match pending.remove(&seq) {
            Some((_, waiter)) => {
                if let Ok(reply) = &reply {
                    tracing::debug!("<- {} #{} {}", ral_id, seq, reply.operation());
                }
                let _ = waiter.send(reply);
            }
            None => tracing::warn!("Unmatched reply #{} from {}", seq, ral_id),
        }
    }

    // Worker is gone: dropping the senders wakes every waiter
    if !pending.is_empty() {
        tracing::warn!(
            "Channel to {} closed with {} calls outstanding",
            ral_id,
            pending.len()
        );
    }
    pending.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlcluster_core::{CorrelationToken, MessageId};

    fn pair() -> (WorkerChannel, mpsc::Receiver<String>, mpsc::Sender<String>) {
        let (req_tx, req_rx) = mpsc::channel(8);
        let (rep_tx, rep_rx) = mpsc::channel(8);
        (WorkerChannel::new(RalId(1), req_tx, rep_rx), req_rx, rep_tx)
    }

    fn drop_request() -> Request {
        Request::DropTable {
            table_name: "t".to_string(),
        }
    }

    #[tokio::test]
    async fn test_replies_routed_by_seq() {
        let (channel, mut req_rx, rep_tx) = pair();
        let channel = Arc::new(channel);

        let first = tokio::spawn({
            let channel = Arc::clone(&channel);
            async move { channel.call(drop_request()).await }
        });
        let second = tokio::spawn({
            let channel = Arc::clone(&channel);
            async move {
                channel
                    .call(Request::RunQuery {
                        correlation_token: CorrelationToken(2),
                        message_id: MessageId::from_token(CorrelationToken(2)),
                        query: "SELECT * FROM t".to_string(),
                    })
                    .await
            }
        });

        let mut seqs = Vec::new();
        for _ in 0..2 {
            let frame = req_rx.recv().await.unwrap();
            let (seq, request) = decode::<Request>(&frame).unwrap();
            seqs.push((seq, request.unwrap()));
        }

        // Answer in reverse order
        for (seq, request) in seqs.into_iter().rev() {
            let reply = match request {
                Request::RunQuery {
                    correlation_token,
                    message_id,
                    ..
                } => Reply::QueryRan {
                    correlation_token,
                    message_id,
                },
                _ => Reply::TableDropped,
            };
            rep_tx.send(encode(seq, &reply).unwrap()).await.unwrap();
        }

        assert_eq!(first.await.unwrap().unwrap(), Reply::TableDropped);
        assert!(matches!(
            second.await.unwrap().unwrap(),
            Reply::QueryRan { .. }
        ));
        assert_eq!(channel.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failed_reply_is_participant_failure() {
        let (channel, mut req_rx, rep_tx) = pair();

        let responder = tokio::spawn(async move {
            let frame = req_rx.recv().await.unwrap();
            let (seq, _) = decode::<Request>(&frame).unwrap();
            let reply = Reply::Failed {
                reason: "Table not found: t".to_string(),
            };
            rep_tx.send(encode(seq, &reply).unwrap()).await.unwrap();
            req_rx
        });

        match channel.call(drop_request()).await {
            Err(DistributedError::ParticipantFailed { ral_id, reason }) => {
                assert_eq!(ral_id, RalId(1));
                assert!(reason.contains("Table not found"));
            }
            other => panic!("expected participant failure, got {:?}", other),
        }
        let _ = responder.await;
    }

    #[tokio::test]
    async fn test_worker_gone_fails_outstanding_calls() {
        let (channel, mut req_rx, rep_tx) = pair();

        let killer = tokio::spawn(async move {
            let _ = req_rx.recv().await;
            drop(rep_tx);
            drop(req_rx);
        });

        assert!(matches!(
            channel.call(drop_request()).await,
            Err(DistributedError::ChannelClosed(RalId(1)))
        ));
        killer.await.unwrap();

        assert!(matches!(
            channel.call(drop_request()).await,
            Err(DistributedError::ChannelClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_reply_operation() {
        let (channel, mut req_rx, rep_tx) = pair();

        let responder = tokio::spawn(async move {
            let frame = req_rx.recv().await.unwrap();
            let (seq, _) = decode::<Request>(&frame).unwrap();
            rep_tx
                .send(format!(r#"{{"seq": {}, "operation": "ranAway"}}"#, seq))
                .await
                .unwrap();
            (req_rx, rep_tx)
        });

        assert!(matches!(
            channel.call(drop_request()).await,
            Err(DistributedError::ProtocolViolation(_))
        ));
        let _ = responder.await;
    }
}
