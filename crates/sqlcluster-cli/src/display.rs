//! Rendering of query results and cluster state

use crate::config::OutputFormat;
use anyhow::Result;
use arrow::array::Array;
use arrow::csv::Writer as CsvWriter;
use arrow::datatypes::DataType;
use arrow::json::ArrayWriter;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use colored::Colorize;
use comfy_table::{Cell, Color, Table as ComfyTable};
use sqlcluster_core::PartitionSlice;
use sqlcluster_distributed::ClusterStatus;
use std::io::Write;

pub fn print_batch(batch: &RecordBatch, format: OutputFormat, max_rows: usize) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", render_table(batch, max_rows)?);
            if batch.num_rows() > max_rows {
                println!(
                    "{}",
                    format!("... {} more rows", batch.num_rows() - max_rows).bright_black()
                );
            }
        }
        OutputFormat::Json => {
            let mut out = std::io::stdout().lock();
            write_json(batch, &mut out)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => write_csv(batch, std::io::stdout().lock())?,
    }
    Ok(())
}

/// At most `max_rows` rows of `batch` as a table
pub fn render_table(batch: &RecordBatch, max_rows: usize) -> Result<ComfyTable> {
    let mut table = ComfyTable::new();
    table.set_header(
        batch
            .schema()
            .fields()
            .iter()
            .map(|f| Cell::new(f.name()).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );

    for row in 0..batch.num_rows().min(max_rows) {
        let cells = batch
            .columns()
            .iter()
            .map(|column| {
                if column.is_null(row) {
                    Ok("NULL".to_string())
                } else {
                    array_value_to_string(column, row)
                }
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        table.add_row(cells);
    }
    Ok(table)
}

pub fn write_json<W: Write>(batch: &RecordBatch, out: W) -> Result<()> {
    let mut writer = ArrayWriter::new(out);
    writer.write(batch)?;
    writer.finish()?;
    Ok(())
}

pub fn write_csv<W: Write>(batch: &RecordBatch, out: W) -> Result<()> {
    let mut writer = CsvWriter::new(out);
    writer.write(batch)?;
    Ok(())
}

pub fn columns_table(columns: &[(String, DataType)]) -> ComfyTable {
    let mut table = ComfyTable::new();
    table.set_header(vec![
        Cell::new("Column").fg(Color::Cyan),
        Cell::new("Type").fg(Color::Yellow),
    ]);
    for (name, data_type) in columns {
        table.add_row(vec![name.clone(), data_type.to_string()]);
    }
    table
}

pub fn slices_table(slices: &[PartitionSlice]) -> ComfyTable {
    let mut table = ComfyTable::new();
    table.set_header(vec![
        Cell::new("Participant").fg(Color::Cyan),
        Cell::new("Offset").fg(Color::Yellow),
        Cell::new("Length").fg(Color::Green),
        Cell::new("Files").fg(Color::Magenta),
    ]);

    for (index, slice) in slices.iter().enumerate() {
        let files = slice.table.locations();
        let shown = if files.is_empty() {
            "-".to_string()
        } else {
            files.join("\n")
        };
        table.add_row(vec![
            format!("ral-{}", index),
            slice.offset.start.to_string(),
            slice.offset.len.to_string(),
            shown,
        ]);
    }
    table
}

pub fn status_table(status: &ClusterStatus) -> ComfyTable {
    let mut table = ComfyTable::new();
    table.set_header(vec![
        Cell::new("Metric").fg(Color::Cyan),
        Cell::new("Value").fg(Color::Green),
    ]);
    table.add_row(vec!["Cluster".to_string(), status.id.to_string()]);
    table.add_row(vec!["State".to_string(), status.state.to_string()]);
    table.add_row(vec!["Protocol".to_string(), status.protocol.clone()]);
    table.add_row(vec!["Workers".to_string(), status.workers.to_string()]);
    table.add_row(vec!["Tokens issued".to_string(), status.tokens_issued.to_string()]);
    for (index, address) in status.participants.iter().enumerate() {
        table.add_row(vec![format!("ral-{}", index), address.endpoint()]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use sqlcluster_core::{SliceOffset, SourceKind, TableReference};
    use std::sync::Arc;

    fn create_test_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec![Some("ann"), None, Some("cy")])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_render_table_truncates() {
        let rendered = render_table(&create_test_batch(), 2).unwrap().to_string();
        assert!(rendered.contains("ann"));
        assert!(rendered.contains("NULL"));
        assert!(!rendered.contains("cy"));
    }

    #[test]
    fn test_json_and_csv() {
        let mut json = Vec::new();
        write_json(&create_test_batch(), &mut json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value[0]["id"], 1);
        assert_eq!(value[0]["name"], "ann");

        let mut csv = Vec::new();
        write_csv(&create_test_batch(), &mut csv).unwrap();
        let csv = String::from_utf8(csv).unwrap();
        assert!(csv.starts_with("id,name\n1,ann\n"));
    }

    #[test]
    fn test_slices_table_shows_empty_slices() {
        let table = TableReference::new("t", SourceKind::Csv, vec!["a.csv".to_string()]);
        let slices = vec![
            PartitionSlice::new(table.restrict(0, 1), SliceOffset::new(0, 1)),
            PartitionSlice::new(table.restrict(1, 0), SliceOffset::new(1, 0)),
        ];
        let rendered = slices_table(&slices).to_string();
        assert!(rendered.contains("a.csv"));
        assert!(rendered.contains("ral-1"));
        assert_eq!(rendered.matches("a.csv").count(), 1);
    }
}
