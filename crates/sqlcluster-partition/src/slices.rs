//! Source-location slicing

use sqlcluster_core::{PartitionSlice, QueryError, Result, SliceOffset, TableReference};

/// Split `table`'s source locations into exactly `n` ordered, disjoint slices.
///
/// Every slice but the last takes `remaining / slices_left` locations; the
/// last one takes whatever is left, so rounding leftovers land at the end.
/// The last participant may therefore read up to `n - 1` more files than
/// the others; callers must not assume equal slice sizes.
/// A table without locations yields `n` schema-only slices.
pub fn plan_slices(table: &TableReference, n: usize) -> Result<Vec<PartitionSlice>> {
    check_parts(n)?;
    table.validate()?;

    if table.locations().is_empty() {
        return Ok(schema_only_slices(table, n));
    }

    let mut slices = Vec::with_capacity(n);
    let mut remaining = table.locations().len();
    let mut start = 0;

    for i in 0..n {
        let batch_size = if i + 1 == n {
            remaining
        } else {
            remaining / (n - i)
        };

        slices.push(PartitionSlice::new(
            table.restrict(start, batch_size),
            SliceOffset::new(start, batch_size),
        ));

        start += batch_size;
        remaining -= batch_size;
    }

    Ok(slices)
}

/// One slice per entry of the table's file-to-worker mapping.
///
/// Entries are taken in mapping order and offsets are the running sum of
/// entry lengths. Without a mapping this falls back to `n` schema-only
/// slices.
pub fn plan_slices_by_worker_mapping(
    table: &TableReference,
    n: usize,
) -> Result<Vec<PartitionSlice>> {
    check_parts(n)?;
    table.validate()?;

    let mapping = match table.worker_mapping() {
        Some(mapping) if !mapping.is_empty() => mapping,
        _ => return Ok(schema_only_slices(table, n)),
    };

    let mut start = 0;
    let slices = mapping
        .iter()
        .map(|entry| {
            let len = entry.files.len();
            let slice = PartitionSlice {
                table: table.with_locations(entry.files.clone()),
                offset: SliceOffset::new(start, len),
                worker: Some(entry.worker.clone()),
            };
            start += len;
            slice
        })
        .collect();

    Ok(slices)
}

fn schema_only_slices(table: &TableReference, n: usize) -> Vec<PartitionSlice> {
    (0..n)
        .map(|_| PartitionSlice::new(table.schema_only(), SliceOffset::default()))
        .collect()
}

fn check_parts(n: usize) -> Result<()> {
    if n == 0 {
        return Err(QueryError::PartitionError(
            "Cannot plan slices for zero participants".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlcluster_core::{ColumnType, SourceKind, WorkerFiles};

    fn files(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("s3://bucket/part-{i}.parquet")).collect()
    }

    fn create_test_table(locations: usize) -> TableReference {
        TableReference::new("trips", SourceKind::Parquet, files(locations)).with_columns(
            vec!["id".into(), "fare".into()],
            vec![ColumnType::Int64, ColumnType::Float64],
        )
    }

    #[test]
    fn test_slices_cover_all_locations() {
        for n in 1..=8 {
            for r in 0..=40 {
                let table = create_test_table(r);
                let slices = plan_slices(&table, n).unwrap();
                assert_eq!(slices.len(), n, "n={n} r={r}");

                let mut rebuilt = Vec::new();
                let mut expected_start = 0;
                for slice in &slices {
                    if r > 0 {
                        assert_eq!(slice.offset.start, expected_start, "n={n} r={r}");
                    }
                    assert_eq!(slice.offset.len, slice.table.locations().len());
                    expected_start = slice.offset.end();
                    rebuilt.extend_from_slice(slice.table.locations());
                }
                assert_eq!(rebuilt, table.locations(), "n={n} r={r}");
            }
        }
    }

    #[test]
    fn test_leftover_goes_to_last_slice() {
        let sizes: Vec<usize> = plan_slices(&create_test_table(10), 3)
            .unwrap()
            .iter()
            .map(|s| s.offset.len)
            .collect();
        assert_eq!(sizes, vec![3, 3, 4]);

        let sizes: Vec<usize> = plan_slices(&create_test_table(9), 3)
            .unwrap()
            .iter()
            .map(|s| s.offset.len)
            .collect();
        assert_eq!(sizes, vec![3, 3, 3]);
    }

    #[test]
    fn test_single_slice_takes_everything() {
        let slices = plan_slices(&create_test_table(5), 1).unwrap();
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].offset, SliceOffset::new(0, 5));
    }

    #[test]
    fn test_empty_table_yields_schema_only_slices() {
        let table = TableReference::in_memory("logical").with_columns(
            vec!["a".into(), "b".into()],
            vec![ColumnType::Int32, ColumnType::Utf8],
        );

        for n in 1..=5 {
            let slices = plan_slices(&table, n).unwrap();
            assert_eq!(slices.len(), n);
            for slice in slices {
                assert!(slice.is_empty());
                assert_eq!(slice.table.column_names(), table.column_names());
                assert_eq!(slice.table.column_types(), table.column_types());
            }
        }
    }

    #[test]
    fn test_slices_share_column_metadata() {
        let table = create_test_table(6);
        for slice in plan_slices(&table, 4).unwrap() {
            assert!(slice.table.shares_schema_with(&table));
        }
    }

    #[test]
    fn test_row_groups_follow_locations() {
        let table = create_test_table(4).with_row_group_ids(vec![
            vec![0],
            vec![0, 1],
            vec![2],
            vec![3, 4],
        ]);
        let slices = plan_slices(&table, 2).unwrap();
        assert_eq!(slices[0].table.row_group_ids().unwrap(), &[vec![0], vec![0, 1]]);
        assert_eq!(slices[1].table.row_group_ids().unwrap(), &[vec![2], vec![3, 4]]);
    }

    #[test]
    fn test_invalid_input_fails_fast() {
        assert!(matches!(
            plan_slices(&create_test_table(3), 0),
            Err(QueryError::PartitionError(_))
        ));

        let mismatched = TableReference::new("t", SourceKind::Csv, files(2))
            .with_columns(vec!["a".into()], vec![]);
        assert!(plan_slices(&mismatched, 2).is_err());

        let bad_row_groups = create_test_table(3).with_row_group_ids(vec![vec![0]]);
        assert!(plan_slices(&bad_row_groups, 2).is_err());
    }

    #[test]
    fn test_worker_mapping_slices() {
        let table = create_test_table(0).with_worker_mapping(vec![
            WorkerFiles::new("10.0.0.2", vec!["a.parquet".into(), "b.parquet".into()]),
            WorkerFiles::new("10.0.0.1", vec!["c.parquet".into()]),
            WorkerFiles::new("10.0.0.3", vec!["d.parquet".into(), "e.parquet".into()]),
        ]);

        let slices = plan_slices_by_worker_mapping(&table, 3).unwrap();
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0].worker.as_deref(), Some("10.0.0.2"));
        assert_eq!(slices[0].offset, SliceOffset::new(0, 2));
        assert_eq!(slices[1].offset, SliceOffset::new(2, 1));
        assert_eq!(slices[2].offset, SliceOffset::new(3, 2));
        assert_eq!(slices[2].table.locations(), &["d.parquet", "e.parquet"]);
        assert_eq!(slices[1].table.column_names(), table.column_names());
    }

    #[test]
    fn test_worker_mapping_keeps_uri_values() {
        let table = create_test_table(3)
            .with_uri_values(vec!["y=1".into(), "y=2".into(), "y=3".into()])
            .with_worker_mapping(vec![
                WorkerFiles::new("10.0.0.1", vec![files(3)[2].clone()]),
                WorkerFiles::new("10.0.0.2", vec![files(3)[0].clone(), files(3)[1].clone()]),
            ]);

        let slices = plan_slices_by_worker_mapping(&table, 2).unwrap();
        assert_eq!(slices[0].table.uri_values().unwrap(), &["y=3".to_string()]);
        assert_eq!(
            slices[1].table.uri_values().unwrap(),
            &["y=1".to_string(), "y=2".to_string()]
        );
    }

    #[test]
    fn test_worker_mapping_fallback() {
        let slices = plan_slices_by_worker_mapping(&create_test_table(4), 3).unwrap();
        assert_eq!(slices.len(), 3);
        assert!(slices.iter().all(|s| s.is_empty() && s.worker.is_none()));

        assert!(plan_slices_by_worker_mapping(&create_test_table(4), 0).is_err());
    }
}
