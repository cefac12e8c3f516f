pub mod error;
pub mod ids;
pub mod metadata;
pub mod table;
pub mod types;

pub use error::{QueryError, Result};
pub use ids::{CorrelationToken, MessageId, RalId, TokenAllocator};
pub use metadata::{ClusterMetadata, WorkerAddress};
pub use table::{PartitionSlice, SliceOffset, SourceKind, TableReference, WorkerFiles};
pub use types::ColumnType;
