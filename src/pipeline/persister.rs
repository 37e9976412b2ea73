//! Conversion to the storage representation and the two overwrite writes.

use anyhow::{Context, Result};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::sync::Arc;

use super::PipelineContext;
use super::cleaner::rename_columns;
use crate::lakehouse::{CommitSummary, SchemaStatus, WriteOptions};
use crate::schema::TableSchema;

/// Storage representation: every field nullable, no spaces in column names,
/// validated against the persisted schema
pub fn prepare_for_storage(joined: &RecordBatch) -> Result<RecordBatch> {
    let frame = to_storage_frame(joined)?;
    let renamed = replace_spaces_in_column_names(&frame)?;
    TableSchema::character_info_full().validate(&renamed)?;
    Ok(renamed)
}

/// Mark every field nullable
pub fn to_storage_frame(batch: &RecordBatch) -> Result<RecordBatch> {
    let schema = batch.schema();
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|field| field.as_ref().clone().with_nullable(true))
        .collect();

    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    RecordBatch::try_new_with_options(
        Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone())),
        batch.columns().to_vec(),
        &options,
    )
    .context("Failed to convert to storage representation")
}

/// Replace every space in column names with an underscore
///
/// Names that collide after the rename are kept as duplicates.
pub fn replace_spaces_in_column_names(batch: &RecordBatch) -> Result<RecordBatch> {
    rename_columns(batch, |name| name.replace(' ', "_"))
}

pub async fn ensure_schema(ctx: &PipelineContext) -> Result<SchemaStatus> {
    ctx.lakehouse()
        .create_schema_if_not_exists(&ctx.config().target_schema)
        .await
}

/// Write A: full overwrite of the managed table
pub async fn write_managed_table(ctx: &PipelineContext, batch: &RecordBatch) -> Result<CommitSummary> {
    let config = ctx.config();
    ctx.lakehouse()
        .save_as_table(
            batch,
            &config.target_schema,
            &config.target_table,
            &WriteOptions::full_overwrite(),
        )
        .await
}

/// Write B: full overwrite of the file dataset
pub async fn write_file_dataset(ctx: &PipelineContext, batch: &RecordBatch) -> Result<CommitSummary> {
    ctx.lakehouse()
        .save(
            batch,
            &ctx.config().file_dataset_path,
            &WriteOptions::full_overwrite(),
        )
        .await
}
