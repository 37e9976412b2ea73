//! Conversion from row-based string records to an Arrow RecordBatch.
//!
//! Delimited files arrive as rows of optional strings (`None` for null
//! tokens). Each column is typed either by the declared schema or by
//! inference, then built column-by-column into Arrow arrays.

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::sync::Arc;

use crate::error::PipelineError;
use crate::schema::{ColumnType, TableSchema, TypeInferrer};

/// A parsed delimited file before typing
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    /// One entry per header in every row; `None` is null
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    fn column_values(&self, col_idx: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows.iter().map(move |row| row[col_idx].as_deref())
    }
}

/// Build a typed RecordBatch from a raw table
///
/// Declared columns are parsed with their declared type; a value that does not
/// parse fails validation. Other columns get an inferred type.
pub fn raw_table_to_batch(raw: &RawTable, schema: &TableSchema) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(raw.headers.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(raw.headers.len());

    for (col_idx, header) in raw.headers.iter().enumerate() {
        let column_type = schema
            .declared_type(header)
            .unwrap_or_else(|| TypeInferrer::infer_column_type(raw.column_values(col_idx)));

        let array = build_array(raw, col_idx, column_type).map_err(|(row_idx, value)| {
            PipelineError::schema_validation(
                &schema.name,
                format!(
                    "value '{}' in column '{}' (row {}) is not a valid {:?}",
                    value,
                    header,
                    row_idx + 1,
                    column_type
                ),
            )
        })?;

        fields.push(Field::new(header, column_type.data_type(), true));
        columns.push(array);
    }

    let options = RecordBatchOptions::new().with_row_count(Some(raw.rows.len()));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), columns, &options)
        .context("Failed to assemble record batch")
}

/// Build one column; on a parse failure returns the row index and value
fn build_array(
    raw: &RawTable,
    col_idx: usize,
    column_type: ColumnType,
) -> Result<ArrayRef, (usize, String)> {
    let values = raw.column_values(col_idx).enumerate();
    let bad = |row_idx: usize, value: &str| (row_idx, value.to_string());

    let array: ArrayRef = match column_type {
        ColumnType::Utf8 => {
            let mut builder = StringBuilder::with_capacity(raw.rows.len(), 0);
            for (_, value) in values {
                builder.append_option(value);
            }
            Arc::new(builder.finish())
        }
        ColumnType::Int64 => {
            let mut builder = Int64Builder::with_capacity(raw.rows.len());
            for (row_idx, value) in values {
                match value {
                    Some(v) => builder.append_value(v.parse().map_err(|_| bad(row_idx, v))?),
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnType::Float64 => {
            let mut builder = Float64Builder::with_capacity(raw.rows.len());
            for (row_idx, value) in values {
                match value {
                    Some(v) => builder.append_value(v.parse().map_err(|_| bad(row_idx, v))?),
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(raw.rows.len());
            for (row_idx, value) in values {
                match value {
                    Some(v) => builder
                        .append_value(TypeInferrer::parse_bool(v).ok_or_else(|| bad(row_idx, v))?),
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
    };

    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{DataType, Float64Type};

    fn raw(headers: &[&str], rows: &[&[Option<&str>]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|v| v.map(str::to_string)).collect())
                .collect(),
        }
    }

    #[test]
    fn test_inferred_and_declared_types() {
        let table = raw(
            &["Name", "Speed", "Ki Blast", "Flying"],
            &[
                &[Some("Goku"), Some("90"), Some("9.5"), Some("True")],
                &[Some("Krillin"), None, Some("7"), Some("False")],
            ],
        );

        let batch = raw_table_to_batch(&table, &TableSchema::character_stats()).unwrap();
        let schema = batch.schema();

        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        // Speed has a missing value so it is read as floating point
        assert_eq!(schema.field(1).data_type(), &DataType::Float64);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
        assert_eq!(schema.field(3).data_type(), &DataType::Boolean);
        assert!(schema.fields().iter().all(|f| f.is_nullable()));

        let speed = batch.column(1).as_primitive::<Float64Type>();
        assert_eq!(speed.value(0), 90.0);
        assert!(speed.is_null(1));

        let ki_blast = batch.column(2).as_primitive::<Float64Type>();
        assert_eq!(ki_blast.value(1), 7.0);
    }

    #[test]
    fn test_declared_text_column_keeps_numbers_as_text() {
        // A numeric-looking name must stay a string
        let table = raw(&["name", "speed"], &[&[Some("17"), Some("80")]]);
        let batch = raw_table_to_batch(&table, &TableSchema::character_stats()).unwrap();

        assert_eq!(batch.schema().field(0).data_type(), &DataType::Utf8);
        assert_eq!(batch.column(0).as_string::<i32>().value(0), "17");
    }

    #[test]
    fn test_header_only_table() {
        let table = raw(&["name", "speed"], &[]);
        let batch = raw_table_to_batch(&table, &TableSchema::character_stats()).unwrap();

        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(batch.schema().field(1).data_type(), &DataType::Float64);
    }

    #[test]
    fn test_declared_type_parse_failure() {
        let mut schema = TableSchema::character_stats();
        schema.columns[1].column_type = Some(ColumnType::Int64);

        let table = raw(&["name", "ki blast"], &[&[Some("Goku"), Some("over 9000")]]);
        let err = raw_table_to_batch(&table, &schema).unwrap_err();

        let pipeline_err = err.downcast_ref::<PipelineError>().unwrap();
        assert!(matches!(pipeline_err, PipelineError::SchemaValidation { .. }));
        assert!(err.to_string().contains("'over 9000' in column 'ki blast' (row 1)"));
    }
}
