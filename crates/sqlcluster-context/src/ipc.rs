//! Arrow IPC encoding for batches that cross a participant boundary

use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use sqlcluster_core::{QueryError, Result};
use std::io::Cursor;

/// Serialized record batch for transfer between participants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedBatch {
    /// IPC-encoded Arrow data
    pub data: Vec<u8>,
    /// Number of rows
    pub num_rows: usize,
}

impl SerializedBatch {
    /// Serialize a record batch using Arrow IPC stream format
    pub fn from_batch(batch: &RecordBatch) -> Result<Self> {
        let mut buffer = Vec::new();
        {
            let mut writer = StreamWriter::try_new(&mut buffer, &batch.schema())
                .map_err(|e| QueryError::SerializationError(e.to_string()))?;
            writer
                .write(batch)
                .map_err(|e| QueryError::SerializationError(e.to_string()))?;
            writer
                .finish()
                .map_err(|e| QueryError::SerializationError(e.to_string()))?;
        }

        Ok(Self {
            data: buffer,
            num_rows: batch.num_rows(),
        })
    }

    /// Deserialize to a record batch.
    ///
    /// A stream carrying only a schema decodes to an empty batch of that
    /// schema.
    pub fn to_batch(&self) -> Result<RecordBatch> {
        let cursor = Cursor::new(&self.data);
        let mut reader = StreamReader::try_new(cursor, None)
            .map_err(|e| QueryError::SerializationError(e.to_string()))?;
        let schema = reader.schema();

        match reader.next() {
            Some(batch) => batch.map_err(|e| QueryError::SerializationError(e.to_string())),
            None => Ok(RecordBatch::new_empty(schema)),
        }
    }

    /// Encoded size in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

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

    #[test]
    fn test_serialize_deserialize_batch() {
        let batch = create_test_batch();
        let serialized = SerializedBatch::from_batch(&batch).unwrap();
        assert_eq!(serialized.num_rows, 3);

        let deserialized = serialized.to_batch().unwrap();
        assert_eq!(deserialized.num_rows(), 3);
        assert_eq!(deserialized.num_columns(), 2);
    }

    #[test]
    fn test_empty_batch_keeps_schema() {
        let batch = create_test_batch().slice(0, 0);
        let serialized = SerializedBatch::from_batch(&batch).unwrap();

        let deserialized = serialized.to_batch().unwrap();
        assert_eq!(deserialized.num_rows(), 0);
        assert_eq!(deserialized.schema().field(1).name(), "name");
    }

    #[test]
    fn test_garbage_rejected() {
        let bogus = SerializedBatch {
            data: vec![1, 2, 3],
            num_rows: 0,
        };
        assert!(matches!(
            bogus.to_batch(),
            Err(QueryError::SerializationError(_))
        ));
    }
}
