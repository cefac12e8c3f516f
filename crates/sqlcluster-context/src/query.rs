//! Evaluation and plan rendering for parsed [`SelectQuery`]s

use crate::sql::{CompareOp, Literal, Predicate, Projection, SelectQuery};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, Scalar, StringArray,
};
use arrow::compute::kernels::cmp::{eq, gt, gt_eq, lt, lt_eq, neq};
use arrow::compute::{and, cast, filter_record_batch};
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use sqlcluster_core::{QueryError, Result};
use std::fmt::Write;
use std::sync::Arc;

/// Run `query` over `batch`: filter, then project, then limit
pub fn execute(query: &SelectQuery, batch: &RecordBatch) -> Result<RecordBatch> {
    let filtered = apply_selection(&query.selection, batch)?;

    let indices = projection_indices(&query.projection, &batch.schema())?;
    let projected = filtered.project(&indices)?;

    Ok(match query.limit {
        Some(limit) if limit < projected.num_rows() => projected.slice(0, limit),
        _ => projected,
    })
}

/// Output schema of `query` over a table with `schema`
pub fn output_schema(query: &SelectQuery, schema: &SchemaRef) -> Result<SchemaRef> {
    let indices = projection_indices(&query.projection, schema)?;
    Ok(Arc::new(schema.project(&indices)?))
}

fn projection_indices(projection: &Projection, schema: &SchemaRef) -> Result<Vec<usize>> {
    match projection {
        Projection::Wildcard => Ok((0..schema.fields().len()).collect()),
        Projection::Columns(columns) => columns
            .iter()
            .map(|name| column_index(schema, name))
            .collect(),
    }
}

fn column_index(schema: &SchemaRef, name: &str) -> Result<usize> {
    schema
        .index_of(name)
        .map_err(|_| QueryError::ColumnNotFound(name.to_string()))
}

fn apply_selection(selection: &[Predicate], batch: &RecordBatch) -> Result<RecordBatch> {
    let mut mask: Option<BooleanArray> = None;

    for predicate in selection {
        let current = evaluate_predicate(predicate, batch)?;
        mask = Some(match mask {
            Some(prev) => and(&prev, &current)?,
            None => current,
        });
    }

    match mask {
        Some(mask) => Ok(filter_record_batch(batch, &mask)?),
        None => Ok(batch.clone()),
    }
}

fn evaluate_predicate(predicate: &Predicate, batch: &RecordBatch) -> Result<BooleanArray> {
    let index = column_index(&batch.schema(), &predicate.column)?;
    let column = batch.column(index);
    let (left, right) = coerce(column, &predicate.value)?;
    let right = Scalar::new(right);

    let result = match predicate.op {
        CompareOp::Eq => eq(&left, &right)?,
        CompareOp::NotEq => neq(&left, &right)?,
        CompareOp::Lt => lt(&left, &right)?,
        CompareOp::LtEq => lt_eq(&left, &right)?,
        CompareOp::Gt => gt(&left, &right)?,
        CompareOp::GtEq => gt_eq(&left, &right)?,
    };

    Ok(result)
}

/// Bring a column and a literal to one comparable type.
///
/// Integers compare as Int64, mixed numerics as Float64, and string literals
/// against temporal columns are parsed into the column's type.
fn coerce(column: &ArrayRef, literal: &Literal) -> Result<(ArrayRef, ArrayRef)> {
    let data_type = column.data_type();

    let pair = match literal {
        Literal::Integer(v) if data_type.is_integer() => (
            cast(column, &DataType::Int64)?,
            Arc::new(Int64Array::from(vec![*v])) as ArrayRef,
        ),
        Literal::Integer(v) if data_type.is_floating() || is_decimal(data_type) => (
            cast(column, &DataType::Float64)?,
            Arc::new(Float64Array::from(vec![*v as f64])) as ArrayRef,
        ),
        Literal::Float(v) if data_type.is_numeric() => (
            cast(column, &DataType::Float64)?,
            Arc::new(Float64Array::from(vec![*v])) as ArrayRef,
        ),
        Literal::String(v) if matches!(data_type, DataType::Utf8 | DataType::LargeUtf8) => (
            cast(column, &DataType::Utf8)?,
            Arc::new(StringArray::from(vec![v.as_str()])) as ArrayRef,
        ),
        Literal::String(v) if data_type.is_temporal() => {
            let parsed = cast(&(Arc::new(StringArray::from(vec![v.as_str()])) as ArrayRef), data_type)?;
            if parsed.is_null(0) {
                return Err(QueryError::TypeMismatch {
                    expected: data_type.to_string(),
                    found: format!("'{}'", v),
                });
            }
            (Arc::clone(column), parsed)
        }
        Literal::Boolean(v) if data_type == &DataType::Boolean => (
            Arc::clone(column),
            Arc::new(BooleanArray::from(vec![*v])) as ArrayRef,
        ),
        _ => {
            return Err(QueryError::TypeMismatch {
                expected: data_type.to_string(),
                found: literal.to_string(),
            })
        }
    };

    Ok(pair)
}

fn is_decimal(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Decimal128(_, _) | DataType::Decimal256(_, _)
    )
}

/// Render the logical plan of `query`.
///
/// With `detailed`, the physical operators follow, annotated with the row
/// counts seen when running over `batch`.
pub fn explain(query: &SelectQuery, batch: &RecordBatch, detailed: bool) -> Result<String> {
    let schema = batch.schema();
    let indices = projection_indices(&query.projection, &schema)?;
    for predicate in &query.selection {
        column_index(&schema, &predicate.column)?;
    }

    let projects: Vec<String> = indices
        .iter()
        .map(|&i| format!("{}=[${}]", schema.field(i).name(), i))
        .collect();

    let mut logical = Vec::new();
    if let Some(limit) = query.limit {
        logical.push(format!("LogicalSort(fetch=[{}])", limit));
    }
    logical.push(format!("LogicalProject({})", projects.join(", ")));
    if !query.selection.is_empty() {
        logical.push(format!(
            "LogicalFilter(condition=[{}])",
            render_condition(&query.selection)
        ));
    }
    logical.push(format!("LogicalTableScan(table=[[main, {}]])", query.table));

    let mut out = String::new();
    if !detailed {
        render_tree(&mut out, &logical);
        return Ok(out);
    }

    let filtered = apply_selection(&query.selection, batch)?;
    let limited = query
        .limit
        .map_or(filtered.num_rows(), |l| l.min(filtered.num_rows()));

    let mut physical = Vec::new();
    if let Some(limit) = query.limit {
        physical.push(format!("LimitExec(fetch={}) rows={}", limit, limited));
    }
    physical.push(format!(
        "ProjectionExec(columns=[{}]) rows={}",
        indices
            .iter()
            .map(|&i| schema.field(i).name().as_str())
            .collect::<Vec<_>>()
            .join(", "),
        filtered.num_rows()
    ));
    if !query.selection.is_empty() {
        physical.push(format!(
            "FilterExec({}) rows={}",
            render_condition(&query.selection),
            filtered.num_rows()
        ));
    }
    physical.push(format!(
        "MemoryScanExec(table={}, columns={}) rows={}",
        query.table,
        schema.fields().len(),
        batch.num_rows()
    ));

    out.push_str("== Logical Plan ==\n");
    render_tree(&mut out, &logical);
    out.push_str("== Physical Plan ==\n");
    render_tree(&mut out, &physical);
    Ok(out)
}

fn render_condition(selection: &[Predicate]) -> String {
    let parts: Vec<String> = selection.iter().map(|p| p.to_string()).collect();
    if parts.len() == 1 {
        parts.join("")
    } else {
        format!("AND({})", parts.join(", "))
    }
}

fn render_tree(out: &mut String, nodes: &[String]) {
    for (depth, node) in nodes.iter().enumerate() {
        let _ = writeln!(out, "{}{}", "  ".repeat(depth), node);
    }
}
