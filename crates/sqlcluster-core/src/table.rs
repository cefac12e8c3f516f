//! Table references and the slices cut from them

use crate::error::{QueryError, Result};
use crate::types::ColumnType;
use arrow::datatypes::{Field as ArrowField, Schema as ArrowSchema, SchemaRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where a table's data lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Csv,
    Parquet,
    /// Logical table with no file backing
    InMemory,
}

impl SourceKind {
    /// Guess the kind from a file extension
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit('.').next()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "psv" | "tsv" => Some(SourceKind::Csv),
            "parquet" => Some(SourceKind::Parquet),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Csv => write!(f, "csv"),
            SourceKind::Parquet => write!(f, "parquet"),
            SourceKind::InMemory => write!(f, "memory"),
        }
    }
}

/// Files pinned to one worker, typically derived from data locality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFiles {
    pub worker: String,
    pub files: Vec<String>,
}

impl WorkerFiles {
    pub fn new(worker: impl Into<String>, files: Vec<String>) -> Self {
        Self {
            worker: worker.into(),
            files,
        }
    }
}

/// A named dataset description: where the data is and what it looks like
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReference {
    name: String,
    kind: SourceKind,
    locations: Vec<String>,
    column_names: Arc<[String]>,
    column_types: Arc<[ColumnType]>,
    /// One list of row-group ids per location
    row_group_ids: Option<Vec<Vec<usize>>>,
    /// One URI value per location
    uri_values: Option<Vec<String>>,
    worker_mapping: Option<Vec<WorkerFiles>>,
}

impl TableReference {
    pub fn new(name: impl Into<String>, kind: SourceKind, locations: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            locations,
            column_names: Arc::from(Vec::new()),
            column_types: Arc::from(Vec::new()),
            row_group_ids: None,
            uri_values: None,
            worker_mapping: None,
        }
    }

    /// A table with no source locations, only a schema
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::new(name, SourceKind::InMemory, Vec::new())
    }

    pub fn with_columns(mut self, names: Vec<String>, types: Vec<ColumnType>) -> Self {
        self.column_names = Arc::from(names);
        self.column_types = Arc::from(types);
        self
    }

    pub fn with_row_group_ids(mut self, row_group_ids: Vec<Vec<usize>>) -> Self {
        self.row_group_ids = Some(row_group_ids);
        self
    }

    pub fn with_uri_values(mut self, uri_values: Vec<String>) -> Self {
        self.uri_values = Some(uri_values);
        self
    }

    pub fn with_worker_mapping(mut self, mapping: Vec<WorkerFiles>) -> Self {
        self.worker_mapping = Some(mapping);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn column_types(&self) -> &[ColumnType] {
        &self.column_types
    }

    pub fn row_group_ids(&self) -> Option<&[Vec<usize>]> {
        self.row_group_ids.as_deref()
    }

    pub fn uri_values(&self) -> Option<&[String]> {
        self.uri_values.as_deref()
    }

    pub fn worker_mapping(&self) -> Option<&[WorkerFiles]> {
        self.worker_mapping.as_deref()
    }

    pub fn has_columns(&self) -> bool {
        !self.column_names.is_empty()
    }

    /// Check the structural invariants of the reference
    pub fn validate(&self) -> Result<()> {
        if self.column_names.len() != self.column_types.len() {
            return Err(QueryError::PartitionError(format!(
                "Table '{}' has {} column names but {} column types",
                self.name,
                self.column_names.len(),
                self.column_types.len()
            )));
        }
        if let Some(ids) = &self.row_group_ids {
            if ids.len() != self.locations.len() {
                return Err(QueryError::PartitionError(format!(
                    "Table '{}' has {} row-group id lists for {} locations",
                    self.name,
                    ids.len(),
                    self.locations.len()
                )));
            }
        }
        if let Some(uris) = &self.uri_values {
            if uris.len() != self.locations.len() {
                return Err(QueryError::PartitionError(format!(
                    "Table '{}' has {} uri values for {} locations",
                    self.name,
                    uris.len(),
                    self.locations.len()
                )));
            }
        }
        Ok(())
    }

    /// Arrow schema described by the column metadata, if any was given
    pub fn arrow_schema(&self) -> Option<SchemaRef> {
        if !self.has_columns() {
            return None;
        }
        let fields: Vec<ArrowField> = self
            .column_names
            .iter()
            .zip(self.column_types.iter())
            .map(|(name, ty)| ArrowField::new(name.clone(), ty.to_arrow(), true))
            .collect();
        Some(Arc::new(ArrowSchema::new(fields)))
    }

    /// Copy carrying only name, kind and the shared column metadata
    pub fn schema_only(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            locations: Vec::new(),
            column_names: Arc::clone(&self.column_names),
            column_types: Arc::clone(&self.column_types),
            row_group_ids: None,
            uri_values: None,
            worker_mapping: None,
        }
    }

    /// Copy restricted to `locations[start..start + len]`.
    ///
    /// Row-group ids and URI values are narrowed to the same range; column
    /// metadata is shared with `self`. The caller guarantees the range is in
    /// bounds.
    pub fn restrict(&self, start: usize, len: usize) -> Self {
        let end = start + len;
        Self {
            name: self.name.clone(),
            kind: self.kind,
            locations: self.locations[start..end].to_vec(),
            column_names: Arc::clone(&self.column_names),
            column_types: Arc::clone(&self.column_types),
            row_group_ids: self.row_group_ids.as_ref().map(|ids| ids[start..end].to_vec()),
            uri_values: self.uri_values.as_ref().map(|uris| uris[start..end].to_vec()),
            worker_mapping: None,
        }
    }

    /// Copy whose locations are replaced by `files`, keeping the column metadata.
    ///
    /// Row-group ids and uri values follow their file. They are dropped when
    /// any of `files` is not one of this table's locations.
    pub fn with_locations(&self, files: Vec<String>) -> Self {
        let positions: Option<Vec<usize>> = files
            .iter()
            .map(|file| self.locations.iter().position(|l| l == file))
            .collect();
        Self {
            name: self.name.clone(),
            kind: self.kind,
            locations: files,
            column_names: Arc::clone(&self.column_names),
            column_types: Arc::clone(&self.column_types),
            row_group_ids: pick(self.row_group_ids.as_deref(), positions.as_deref()),
            uri_values: pick(self.uri_values.as_deref(), positions.as_deref()),
            worker_mapping: None,
        }
    }

    /// Whether two references share the same column metadata allocation
    pub fn shares_schema_with(&self, other: &TableReference) -> bool {
        Arc::ptr_eq(&self.column_names, &other.column_names)
            && Arc::ptr_eq(&self.column_types, &other.column_types)
    }
}

fn pick<T: Clone>(values: Option<&[T]>, positions: Option<&[usize]>) -> Option<Vec<T>> {
    let (values, positions) = (values?, positions?);
    positions.iter().map(|&i| values.get(i).cloned()).collect()
}

/// Position of a slice inside its parent's location list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SliceOffset {
    pub start: usize,
    pub len: usize,
}

impl SliceOffset {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// A table reference cut down to one participant's share of the sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSlice {
    pub table: TableReference,
    pub offset: SliceOffset,
    /// Worker key when the slice came from a file-to-worker mapping
    pub worker: Option<String>,
}

impl PartitionSlice {
    pub fn new(table: TableReference, offset: SliceOffset) -> Self {
        Self {
            table,
            offset,
            worker: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.table.locations().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("/data/part-{i}.parquet")).collect()
    }

    #[test]
    fn test_validate_column_lengths() {
        let table = TableReference::new("t", SourceKind::Parquet, files(2))
            .with_columns(vec!["a".into(), "b".into()], vec![ColumnType::Int64]);
        assert!(matches!(table.validate(), Err(QueryError::PartitionError(_))));
    }

    #[test]
    fn test_validate_row_groups() {
        let table = TableReference::new("t", SourceKind::Parquet, files(3))
            .with_row_group_ids(vec![vec![0], vec![1]]);
        assert!(table.validate().is_err());

        let table = TableReference::new("t", SourceKind::Parquet, files(2))
            .with_row_group_ids(vec![vec![0], vec![0, 1]]);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_restrict_narrows_parallel_arrays() {
        let table = TableReference::new("t", SourceKind::Parquet, files(4))
            .with_columns(vec!["a".into()], vec![ColumnType::Int32])
            .with_row_group_ids(vec![vec![0], vec![1], vec![2], vec![3]])
            .with_uri_values(vec!["u0".into(), "u1".into(), "u2".into(), "u3".into()]);

        let slice = table.restrict(1, 2);
        assert_eq!(slice.locations(), &files(4)[1..3]);
        assert_eq!(slice.row_group_ids().unwrap(), &[vec![1], vec![2]]);
        assert_eq!(slice.uri_values().unwrap(), &["u1".to_string(), "u2".to_string()]);
        assert!(slice.shares_schema_with(&table));
    }

    #[test]
    fn test_with_locations_keeps_per_file_values() {
        let table = TableReference::new("t", SourceKind::Parquet, files(3))
            .with_row_group_ids(vec![vec![0], vec![1, 2], vec![3]])
            .with_uri_values(vec!["u0".into(), "u1".into(), "u2".into()]);

        let slice = table.with_locations(vec![files(3)[2].clone(), files(3)[0].clone()]);
        assert_eq!(slice.row_group_ids().unwrap(), &[vec![3], vec![0]]);
        assert_eq!(slice.uri_values().unwrap(), &["u2".to_string(), "u0".to_string()]);
        assert!(slice.validate().is_ok());

        let foreign = table.with_locations(vec!["/elsewhere.parquet".to_string()]);
        assert!(foreign.row_group_ids().is_none());
        assert!(foreign.uri_values().is_none());
        assert!(foreign.validate().is_ok());
    }

    #[test]
    fn test_schema_only() {
        let table = TableReference::new("t", SourceKind::Csv, files(2))
            .with_columns(vec!["a".into()], vec![ColumnType::Utf8]);
        let empty = table.schema_only();
        assert!(empty.locations().is_empty());
        assert_eq!(empty.column_names(), table.column_names());
        assert_eq!(empty.arrow_schema().unwrap().field(0).name(), "a");
    }

    #[test]
    fn test_source_kind_from_path() {
        assert_eq!(SourceKind::from_path("x/y.CSV"), Some(SourceKind::Csv));
        assert_eq!(SourceKind::from_path("y.parquet"), Some(SourceKind::Parquet));
        assert_eq!(SourceKind::from_path("y.orc"), None);
    }
}
