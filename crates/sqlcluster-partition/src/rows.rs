//! Row-range slicing of resident tabular data

use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use sqlcluster_core::{QueryError, Result};

/// Contiguous range of rows assigned to one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub start: usize,
    pub len: usize,
}

impl RowRange {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Divide `total_rows` into `parts` contiguous ranges of `ceil(total_rows / parts)` rows.
///
/// Always returns exactly `parts` ranges; trailing ranges shrink or come out
/// empty when the rows run out.
pub fn plan_row_ranges(total_rows: usize, parts: usize) -> Result<Vec<RowRange>> {
    if parts == 0 {
        return Err(QueryError::PartitionError(
            "Cannot split rows across zero participants".to_string(),
        ));
    }

    let chunk = total_rows.div_ceil(parts);
    let ranges = (0..parts)
        .map(|i| {
            let start = (i * chunk).min(total_rows);
            let end = ((i + 1) * chunk).min(total_rows);
            RowRange::new(start, end - start)
        })
        .collect();

    Ok(ranges)
}

/// Zero-copy view of `range` within `batch`
pub fn slice_batch(batch: &RecordBatch, range: RowRange) -> Result<RecordBatch> {
    if range.end() > batch.num_rows() {
        return Err(QueryError::PartitionError(format!(
            "Row range {}..{} exceeds batch of {} rows",
            range.start,
            range.end(),
            batch.num_rows()
        )));
    }
    Ok(batch.slice(range.start, range.len))
}

/// Split `batch` into `parts` contiguous batches following [`plan_row_ranges`]
pub fn split_batch(batch: &RecordBatch, parts: usize) -> Result<Vec<RecordBatch>> {
    plan_row_ranges(batch.num_rows(), parts)?
        .into_iter()
        .map(|range| slice_batch(batch, range))
        .collect()
}
