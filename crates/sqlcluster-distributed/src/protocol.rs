//! Coordinator/worker wire protocol
//!
//! Frames are JSON objects tagged by `operation` with camelCase fields. Every
//! frame also carries a `seq` number chosen by the coordinator; a reply
//! echoes the `seq` of its request and nothing else depends on it.

use crate::error::{DistributedError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlcluster_core::{ClusterMetadata, CorrelationToken, MessageId, PartitionSlice, RalId};

/// Requests sent from the coordinator to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename = "createBlazingContext", rename_all = "camelCase")]
    CreateContext {
        ral_id: RalId,
        cluster_metadata: ClusterMetadata,
    },
    /// Register the partition cached under `message_id` as `table_name`
    #[serde(rename_all = "camelCase")]
    CreateTable {
        table_name: String,
        message_id: MessageId,
    },
    /// Load this worker's slice of a file-backed table
    #[serde(rename_all = "camelCase")]
    CreateTableFromSource { slice: PartitionSlice },
    #[serde(rename_all = "camelCase")]
    DropTable { table_name: String },
    #[serde(rename_all = "camelCase")]
    RunQuery {
        correlation_token: CorrelationToken,
        message_id: MessageId,
        query: String,
    },
}

impl Request {
    /// Wire name of the operation
    pub fn operation(&self) -> &'static str {
        match self {
            Request::CreateContext { .. } => "createBlazingContext",
            Request::CreateTable { .. } => "createTable",
            Request::CreateTableFromSource { .. } => "createTableFromSource",
            Request::DropTable { .. } => "dropTable",
            Request::RunQuery { .. } => "runQuery",
        }
    }
}

/// Replies sent from a worker to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum Reply {
    #[serde(rename = "blazingContextCreated")]
    ContextCreated,
    TableCreated,
    TableDropped,
    #[serde(rename_all = "camelCase")]
    QueryRan {
        correlation_token: CorrelationToken,
        message_id: MessageId,
    },
    /// The request could not be carried out
    Failed { reason: String },
}

impl Reply {
    pub fn operation(&self) -> &'static str {
        match self {
            Reply::ContextCreated => "blazingContextCreated",
            Reply::TableCreated => "tableCreated",
            Reply::TableDropped => "tableDropped",
            Reply::QueryRan { .. } => "queryRan",
            Reply::Failed { .. } => "failed",
        }
    }
}

/// A message body together with its sequence number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub seq: u64,
    #[serde(flatten)]
    pub body: T,
}

/// Frame split into its sequence number and an undecoded body
#[derive(Debug, Deserialize)]
struct RawFrame {
    seq: u64,
    #[serde(flatten)]
    body: serde_json::Map<String, serde_json::Value>,
}

pub fn encode<T: Serialize>(seq: u64, body: &T) -> Result<String> {
    Ok(serde_json::to_string(&Envelope { seq, body })?)
}

/// Decode a frame.
///
/// The outer error means the frame had no usable `seq`; the inner one means
/// the body was not a valid `T` and should be answered on that `seq`.
pub fn decode<T: DeserializeOwned>(frame: &str) -> Result<(u64, Result<T>)> {
    let raw: RawFrame = serde_json::from_str(frame).map_err(|e| {
        DistributedError::ProtocolViolation(format!("Unreadable frame: {}", e))
    })?;

    let operation = raw
        .body
        .get("operation")
        .and_then(|op| op.as_str())
        .unwrap_or("<missing>")
        .to_string();
    let body = serde_json::from_value(serde_json::Value::Object(raw.body)).map_err(|e| {
        DistributedError::ProtocolViolation(format!(
            "Unrecognized message with operation '{}': {}",
            operation, e
        ))
    });

    Ok((raw.seq, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let frame = encode(
            3,
            &Request::RunQuery {
                correlation_token: CorrelationToken(7),
                message_id: MessageId::from_token(CorrelationToken(7)),
                query: "SELECT * FROM t".to_string(),
            },
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({
                "seq": 3,
                "operation": "runQuery",
                "correlationToken": 7,
                "messageId": "message_7",
                "query": "SELECT * FROM t"
            })
        );
    }

    #[test]
    fn test_create_context_wire_format() {
        let metadata = ClusterMetadata::build(2, "0.0.0.0", 4000).unwrap();
        let frame = encode(
            1,
            &Request::CreateContext {
                ral_id: RalId(1),
                cluster_metadata: metadata,
            },
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["operation"], "createBlazingContext");
        assert_eq!(value["ralId"], 1);
        assert_eq!(
            value["clusterMetadata"][1],
            json!({"workerId": "1", "ip": "0.0.0.0", "port": 4001})
        );
    }

    #[test]
    fn test_reply_wire_format() {
        let frame = encode(9, &Reply::TableCreated).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"seq": 9, "operation": "tableCreated"}));

        let frame = encode(2, &Reply::ContextCreated).unwrap();
        assert!(frame.contains("blazingContextCreated"));
    }

    #[test]
    fn test_decode_round_trip() {
        let request = Request::DropTable {
            table_name: "t".to_string(),
        };
        let frame = encode(5, &request).unwrap();
        let (seq, decoded) = decode::<Request>(&frame).unwrap();
        assert_eq!(seq, 5);
        assert_eq!(decoded.unwrap(), request);
        assert_eq!(request.operation(), "dropTable");
    }

    #[test]
    fn test_decode_unknown_operation_keeps_seq() {
        let (seq, body) = decode::<Request>(r#"{"seq": 11, "operation": "shutdown"}"#).unwrap();
        assert_eq!(seq, 11);
        match body {
            Err(DistributedError::ProtocolViolation(msg)) => assert!(msg.contains("shutdown")),
            other => panic!("expected protocol violation, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode::<Reply>("not json"),
            Err(DistributedError::ProtocolViolation(_))
        ));
        assert!(decode::<Reply>(r#"{"operation": "tableCreated"}"#).is_err());
    }
}
