//! Parquet file reader implementation.

use anyhow::{Context, Result, anyhow};
use arrow::array::{Array, ArrayRef};
use arrow::compute::{CastOptions, cast_with_options, concat_batches};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use async_trait::async_trait;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::sync::Arc;
use tracing::debug;

use crate::error::PipelineError;
use crate::formats::reader::TableReader;
use crate::io::{ByteReader, read_all};
use crate::schema::{ColumnType, TableSchema};

/// Parquet file reader that works with any ByteReader implementation
///
/// Dataset files are small, so the whole file is fetched once and decoded
/// from memory.
pub struct GenericParquetReader<R: ByteReader> {
    reader: R,
}

impl<R: ByteReader> GenericParquetReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Decode all row groups into a single batch
    fn decode(&self, data: bytes::Bytes) -> Result<RecordBatch> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(data)
            .context("Failed to read Parquet metadata")?;
        let schema = Arc::clone(builder.schema());
        debug!(
            "{} has {} row groups",
            self.reader.describe(),
            builder.metadata().num_row_groups()
        );

        let batches = builder
            .build()
            .context("Failed to build Parquet reader")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read record batch")?;

        concat_batches(&schema, &batches).context("Failed to combine row groups")
    }
}

/// Cast every column to its in-memory type (Int64, Float64, Utf8, Boolean)
///
/// Declared columns take their declared type and a value that does not
/// convert fails validation. The rest keep the family of their stored type,
/// except integer columns with missing values, which become floating point.
fn normalize_batch(batch: &RecordBatch, schema: &TableSchema) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };

    for (field, column) in batch.schema().fields().iter().zip(batch.columns()) {
        let stored = ColumnType::from_data_type(field.data_type()).ok_or_else(|| {
            anyhow!(
                "Column '{}' has unsupported Parquet type {}",
                field.name(),
                field.data_type()
            )
        })?;
        let target = match schema.declared_type(field.name()) {
            Some(declared) => declared,
            None if stored == ColumnType::Int64 && column.null_count() > 0 => ColumnType::Float64,
            None => stored,
        };

        let column = cast_with_options(column, &target.data_type(), &options).map_err(|e| {
            PipelineError::schema_validation(
                &schema.name,
                format!("column '{}' is not a valid {:?}: {}", field.name(), target, e),
            )
        })?;
        fields.push(Field::new(field.name(), target.data_type(), true));
        columns.push(column);
    }

    let batch_options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), columns, &batch_options)
        .context("Failed to assemble record batch")
}

#[async_trait]
impl<R: ByteReader + 'static> TableReader for GenericParquetReader<R> {
    async fn read_table(&self, schema: &TableSchema) -> Result<RecordBatch> {
        let data = read_all(&self.reader).await?;
        debug!("Read {} bytes from {}", data.len(), self.reader.describe());

        let batch = self
            .decode(data)
            .with_context(|| format!("Failed to parse {}", self.reader.describe()))?;

        normalize_batch(&batch, schema)
    }

    fn describe(&self) -> String {
        self.reader.describe()
    }
}
