//! Stats cleaning: duplicate removal and header normalization.

use anyhow::{Context, Result};
use arrow::array::UInt32Array;
use arrow::compute::take_record_batch;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::row::{RowConverter, SortField};
use std::collections::HashSet;
use std::sync::Arc;

/// Deduplicate then lowercase the column names
pub fn clean_stats(batch: &RecordBatch) -> Result<RecordBatch> {
    let deduplicated = dedupe_keep_last(batch)?;
    lowercase_columns(&deduplicated)
}

/// Drop rows identical to a later row across all columns
///
/// The last occurrence survives and survivors keep their relative order.
/// Nulls compare equal to nulls.
pub fn dedupe_keep_last(batch: &RecordBatch) -> Result<RecordBatch> {
    if batch.num_columns() == 0 || batch.num_rows() == 0 {
        return Ok(batch.clone());
    }

    let sort_fields = batch
        .schema()
        .fields()
        .iter()
        .map(|field| SortField::new(field.data_type().clone()))
        .collect();
    let converter = RowConverter::new(sort_fields).context("Failed to create row converter")?;
    let rows = converter
        .convert_columns(batch.columns())
        .context("Failed to encode rows")?;

    let mut seen = HashSet::with_capacity(rows.num_rows());
    let mut keep: Vec<u32> = Vec::with_capacity(rows.num_rows());
    for idx in (0..rows.num_rows()).rev() {
        if seen.insert(rows.row(idx)) {
            keep.push(idx as u32);
        }
    }

    if keep.len() == batch.num_rows() {
        return Ok(batch.clone());
    }
    keep.reverse();

    take_record_batch(batch, &UInt32Array::from(keep)).context("Failed to select unique rows")
}

/// Lowercase every column name; types and values are untouched
pub fn lowercase_columns(batch: &RecordBatch) -> Result<RecordBatch> {
    rename_columns(batch, |name| name.to_lowercase())
}

/// Rebuild a batch with renamed columns
pub fn rename_columns(
    batch: &RecordBatch,
    rename: impl Fn(&str) -> String,
) -> Result<RecordBatch> {
    let schema = batch.schema();
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|field| field.as_ref().clone().with_name(rename(field.name())))
        .collect();
    let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));

    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    RecordBatch::try_new_with_options(schema, batch.columns().to_vec(), &options)
        .context("Failed to rename columns")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, ArrayRef, AsArray, Int64Array, StringArray};
    use arrow::datatypes::Int64Type;

    fn stats(names: Vec<Option<&str>>, speeds: Vec<Option<i64>>) -> RecordBatch {
        RecordBatch::try_from_iter(vec![
            ("Name", Arc::new(StringArray::from(names)) as ArrayRef),
            ("Ki Blast", Arc::new(Int64Array::from(speeds)) as ArrayRef),
        ])
        .unwrap()
    }

    fn names(batch: &RecordBatch) -> Vec<Option<&str>> {
        batch.column(0).as_string::<i32>().iter().collect()
    }

    #[test]
    fn test_dedupe_keeps_last_occurrence_in_place() {
        let batch = stats(
            vec![Some("Goku"), Some("Vegeta"), Some("Goku"), Some("Gohan")],
            vec![Some(90), Some(85), Some(90), Some(70)],
        );
        let deduped = dedupe_keep_last(&batch).unwrap();

        // Row 0 is dropped in favour of row 2
        assert_eq!(names(&deduped), vec![Some("Vegeta"), Some("Goku"), Some("Gohan")]);
    }

    #[test]
    fn test_dedupe_requires_all_columns_equal() {
        let batch = stats(
            vec![Some("Goku"), Some("Goku")],
            vec![Some(90), Some(91)],
        );
        assert_eq!(dedupe_keep_last(&batch).unwrap().num_rows(), 2);
    }

    #[test]
    fn test_dedupe_nulls_compare_equal() {
        let batch = stats(
            vec![Some("Buu"), Some("Cell"), Some("Buu")],
            vec![None, Some(80), None],
        );
        let deduped = dedupe_keep_last(&batch).unwrap();

        assert_eq!(names(&deduped), vec![Some("Cell"), Some("Buu")]);
        assert!(deduped.column(1).as_primitive::<Int64Type>().is_null(1));
    }

    #[test]
    fn test_dedupe_is_case_sensitive() {
        let batch = stats(
            vec![Some("goku"), Some("GOKU")],
            vec![Some(90), Some(90)],
        );
        assert_eq!(dedupe_keep_last(&batch).unwrap().num_rows(), 2);
    }

    #[test]
    fn test_clean_stats_lowercases_headers() {
        let batch = stats(vec![Some("Goku")], vec![Some(90)]);
        let cleaned = clean_stats(&batch).unwrap();

        let schema = cleaned.schema();
        let headers: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(headers, vec!["name", "ki blast"]);
        assert_eq!(cleaned.column(1).as_primitive::<Int64Type>().value(0), 90);
    }

    #[test]
    fn test_clean_empty_table() {
        let batch = stats(vec![], vec![]);
        let cleaned = clean_stats(&batch).unwrap();
        assert_eq!(cleaned.num_rows(), 0);
        assert_eq!(cleaned.schema().field(0).name(), "name");
    }
}
