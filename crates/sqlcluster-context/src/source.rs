//! Loading a participant's slice of a file-backed table

use arrow::array::{new_null_array, ArrayRef};
use arrow::compute::{cast, concat_batches};
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use sqlcluster_core::{ColumnType, PartitionSlice, QueryError, Result, SourceKind, TableReference};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

/// Rows sampled when inferring a CSV schema
const INFER_SCHEMA_ROWS: usize = 1000;

/// Fill in the column metadata of `table` from its first source file.
///
/// References that already carry columns, or have no files to look at, are
/// returned unchanged.
pub fn resolve_columns(table: TableReference) -> Result<TableReference> {
    if table.has_columns() {
        return Ok(table);
    }
    let first = match table.locations().first() {
        Some(first) => first.clone(),
        None => return Ok(table),
    };

    let schema = match table.kind() {
        SourceKind::Csv => infer_csv_schema(&first)?.0,
        SourceKind::Parquet => parquet_schema(&first)?,
        SourceKind::InMemory => return Ok(table),
    };

    let mut names = Vec::with_capacity(schema.fields().len());
    let mut types = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let ty = ColumnType::from_arrow(field.data_type()).ok_or_else(|| {
            QueryError::SchemaError(format!(
                "Column '{}' in {} has unsupported type {}",
                field.name(),
                first,
                field.data_type()
            ))
        })?;
        names.push(field.name().clone());
        types.push(ty);
    }

    tracing::debug!(
        "Resolved {} columns for '{}' from {}",
        names.len(),
        table.name(),
        first
    );
    Ok(table.with_columns(names, types))
}

/// Read every source of `slice` into a single batch.
///
/// The slice must carry column metadata; every file is conformed to it, so
/// all participants produce batches of one schema, empty slices included.
pub fn load_slice(slice: &PartitionSlice) -> Result<RecordBatch> {
    let table = &slice.table;
    let schema = table
        .arrow_schema()
        .unwrap_or_else(|| Arc::new(Schema::empty()));

    if slice.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }

    let mut batches = Vec::new();
    for (idx, location) in table.locations().iter().enumerate() {
        let loaded = match table.kind() {
            SourceKind::Csv => read_csv(location, &schema)?,
            SourceKind::Parquet => {
                let row_groups = table.row_group_ids().and_then(|ids| ids.get(idx).cloned());
                read_parquet(location, row_groups)?
            }
            SourceKind::InMemory => {
                return Err(QueryError::PlanningError(format!(
                    "In-memory table '{}' cannot be loaded from '{}'",
                    table.name(),
                    location
                )))
            }
        };
        for batch in loaded {
            batches.push(conform(&batch, &schema)?);
        }
    }

    tracing::debug!(
        "Loaded {} batches for '{}' from {} sources",
        batches.len(),
        table.name(),
        table.locations().len()
    );
    Ok(concat_batches(&schema, &batches)?)
}

/// Cast `batch` to `schema`, matching columns by name.
///
/// Columns missing from the batch come back as nulls.
pub fn conform(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch> {
    if batch.schema() == *schema {
        return Ok(batch.clone());
    }

    let source = batch.schema();
    let columns = schema
        .fields()
        .iter()
        .map(|field| match source.index_of(field.name()) {
            Ok(idx) => {
                let column = batch.column(idx);
                if column.data_type() == field.data_type() {
                    Ok(Arc::clone(column))
                } else {
                    Ok(cast(column, field.data_type())?)
                }
            }
            Err(_) => Ok(new_null_array(field.data_type(), batch.num_rows())),
        })
        .collect::<Result<Vec<ArrayRef>>>()?;

    Ok(RecordBatch::try_new(Arc::clone(schema), columns)?)
}

fn csv_delimiter(path: &str) -> u8 {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        Some(ext) if ext.eq_ignore_ascii_case("psv") => b'|',
        _ => b',',
    }
}

fn infer_csv_schema(path: &str) -> Result<(Schema, File)> {
    let mut file = File::open(path)?;
    let format = Format::default()
        .with_header(true)
        .with_delimiter(csv_delimiter(path));
    let (schema, _) = format.infer_schema(&mut file, Some(INFER_SCHEMA_ROWS))?;
    file.seek(SeekFrom::Start(0))?;
    Ok((schema, file))
}

fn read_csv(path: &str, schema: &SchemaRef) -> Result<Vec<RecordBatch>> {
    let (file_schema, file) = infer_csv_schema(path)?;

    // Read straight into the target schema when the header lines up with it,
    // otherwise read as inferred and conform by name.
    let same_layout = file_schema.fields().len() == schema.fields().len()
        && file_schema
            .fields()
            .iter()
            .zip(schema.fields().iter())
            .all(|(a, b)| a.name() == b.name());
    let read_schema = if same_layout {
        Arc::clone(schema)
    } else {
        Arc::new(file_schema)
    };

    let reader = ReaderBuilder::new(read_schema)
        .with_header(true)
        .with_delimiter(csv_delimiter(path))
        .build(file)?;

    reader
        .into_iter()
        .map(|batch| batch.map_err(|e| e.into()))
        .collect()
}

fn parquet_schema(path: &str) -> Result<Schema> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    Ok(builder.schema().as_ref().clone())
}

fn read_parquet(path: &str, row_groups: Option<Vec<usize>>) -> Result<Vec<RecordBatch>> {
    let file = File::open(path)?;
    let mut builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    if let Some(row_groups) = row_groups {
        let available = builder.metadata().num_row_groups();
        if let Some(bad) = row_groups.iter().find(|&&rg| rg >= available) {
            return Err(QueryError::PlanningError(format!(
                "Row group {} requested from {} which has {} row groups",
                bad, path, available
            )));
        }
        builder = builder.with_row_groups(row_groups);
    }

    builder
        .build()?
        .into_iter()
        .map(|batch| batch.map_err(|e| e.into()))
        .collect()
}
