//! Partition planner for a fixed number of participants

use crate::rows::{plan_row_ranges, split_batch, RowRange};
use crate::slices::{plan_slices, plan_slices_by_worker_mapping};
use arrow::record_batch::RecordBatch;
use sqlcluster_core::{PartitionSlice, QueryError, Result, TableReference};

/// Plans how a table is divided among `participants` execution contexts
#[derive(Debug, Clone, Copy)]
pub struct PartitionPlanner {
    participants: usize,
}

impl PartitionPlanner {
    /// Create a planner, rejecting a participant count of zero
    pub fn new(participants: usize) -> Result<Self> {
        if participants == 0 {
            return Err(QueryError::PartitionError(
                "A partition plan needs at least one participant".to_string(),
            ));
        }
        Ok(Self { participants })
    }

    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Slice a file-backed table.
    ///
    /// A file-to-worker mapping, when present, takes precedence over even
    /// slicing and must produce exactly one slice per participant.
    pub fn plan_table(&self, table: &TableReference) -> Result<Vec<PartitionSlice>> {
        match table.worker_mapping() {
            Some(mapping) if !mapping.is_empty() => {
                let slices = plan_slices_by_worker_mapping(table, self.participants)?;
                if slices.len() != self.participants {
                    return Err(QueryError::PartitionError(format!(
                        "Worker mapping for '{}' has {} entries but the cluster has {} participants",
                        table.name(),
                        slices.len(),
                        self.participants
                    )));
                }
                Ok(slices)
            }
            _ => plan_slices(table, self.participants),
        }
    }

    /// Row ranges for a resident batch of `total_rows` rows
    pub fn plan_rows(&self, total_rows: usize) -> Result<Vec<RowRange>> {
        plan_row_ranges(total_rows, self.participants)
    }

    /// Split a resident batch, one piece per participant
    pub fn split(&self, batch: &RecordBatch) -> Result<Vec<RecordBatch>> {
        split_batch(batch, self.participants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlcluster_core::{SourceKind, WorkerFiles};

    #[test]
    fn test_zero_participants() {
        assert!(PartitionPlanner::new(0).is_err());
    }

    #[test]
    fn test_plan_table_even() {
        let table = TableReference::new(
            "t",
            SourceKind::Csv,
            (0..5).map(|i| format!("{i}.csv")).collect(),
        );
        let planner = PartitionPlanner::new(2).unwrap();
        let slices = planner.plan_table(&table).unwrap();
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].offset.len + slices[1].offset.len, 5);
    }

    #[test]
    fn test_plan_table_mapping_must_match_participants() {
        let table = TableReference::new("t", SourceKind::Csv, vec![]).with_worker_mapping(vec![
            WorkerFiles::new("a", vec!["1.csv".into()]),
            WorkerFiles::new("b", vec!["2.csv".into()]),
        ]);

        assert_eq!(
            PartitionPlanner::new(2).unwrap().plan_table(&table).unwrap().len(),
            2
        );
        assert!(PartitionPlanner::new(3).unwrap().plan_table(&table).is_err());
    }
}
