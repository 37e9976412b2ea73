//! Column selection and the left join of info and stats.

use anyhow::{Context, Result, bail};
use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute::{cast, take};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::row::{RowConverter, SortField};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub const JOIN_KEY: &str = "name";

/// Columns kept from the info table, in output order
pub const INFO_COLUMNS: [&str; 8] = [
    "name",
    "ki",
    "maxKi",
    "race",
    "gender",
    "description",
    "image",
    "affiliation",
];

/// Columns kept from the cleaned stats table, in output order
pub const STATS_COLUMNS: [&str; 6] = [
    "name",
    "ki blast",
    "melee combat",
    "speed",
    "special attack",
    "transformation",
];

/// Joined table plus the number of left rows that found no match
#[derive(Debug, Clone)]
pub struct JoinOutput {
    pub batch: RecordBatch,
    pub unmatched: usize,
}

/// Select and left-join the character tables on `name`
pub fn join_character_tables(info: &RecordBatch, stats: &RecordBatch) -> Result<JoinOutput> {
    let info = select_columns(info, &INFO_COLUMNS).context("Failed to select info columns")?;
    let stats = select_columns(stats, &STATS_COLUMNS).context("Failed to select stats columns")?;
    left_join(&info, &stats, JOIN_KEY)
}

/// Position of the single column named exactly `name`
fn column_index(batch: &RecordBatch, name: &str) -> Result<usize> {
    let schema = batch.schema();
    let mut matches = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, field)| field.name().as_str() == name)
        .map(|(idx, _)| idx);

    match (matches.next(), matches.next()) {
        (Some(idx), None) => Ok(idx),
        (None, _) => {
            let available: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
            bail!("Column '{}' not found; available columns: {:?}", name, available)
        }
        (Some(_), Some(_)) => bail!("Column '{}' is ambiguous", name),
    }
}

/// Project `batch` onto `columns`, in the given order
pub fn select_columns(batch: &RecordBatch, columns: &[&str]) -> Result<RecordBatch> {
    let indices = columns
        .iter()
        .map(|name| column_index(batch, name))
        .collect::<Result<Vec<_>>>()?;

    batch.project(&indices).context("Failed to project columns")
}

/// Left join on a single key column
///
/// Every left row is kept in order and emitted once per matching right row
/// (in right order), or once with null right columns. Keys compare exactly;
/// null keys match null keys. The right key column is dropped and other
/// names present on both sides get `_x` / `_y` suffixes.
///
/// When any left row is unmatched, integer right columns become `Float64`
/// so the missing values read the same way as in the source dataframes.
pub fn left_join(left: &RecordBatch, right: &RecordBatch, on: &str) -> Result<JoinOutput> {
    let left_key_idx = column_index(left, on).context("Invalid join key on the left side")?;
    let right_key_idx = column_index(right, on).context("Invalid join key on the right side")?;

    let left_key = left.column(left_key_idx);
    let right_key = right.column(right_key_idx);
    if left_key.data_type() != right_key.data_type() {
        bail!(
            "Join key '{}' is {} on the left side but {} on the right side",
            on,
            left_key.data_type(),
            right_key.data_type()
        );
    }

    // Both sides are encoded by the same converter so equal keys have equal bytes
    let converter = RowConverter::new(vec![SortField::new(left_key.data_type().clone())])
        .context("Failed to create row converter")?;
    let left_rows = converter
        .convert_columns(&[Arc::clone(left_key)])
        .context("Failed to encode left keys")?;
    let right_rows = converter
        .convert_columns(&[Arc::clone(right_key)])
        .context("Failed to encode right keys")?;

    let mut positions: HashMap<Vec<u8>, Vec<u32>> = HashMap::new();
    for idx in 0..right_rows.num_rows() {
        positions
            .entry(right_rows.row(idx).as_ref().to_vec())
            .or_default()
            .push(idx as u32);
    }

    let mut left_indices: Vec<u32> = Vec::with_capacity(left.num_rows());
    let mut right_indices: Vec<Option<u32>> = Vec::with_capacity(left.num_rows());
    let mut unmatched = 0;

    for idx in 0..left_rows.num_rows() {
        match positions.get::<[u8]>(left_rows.row(idx).as_ref()) {
            Some(matches) => {
                for &right_idx in matches {
                    left_indices.push(idx as u32);
                    right_indices.push(Some(right_idx));
                }
            }
            None => {
                unmatched += 1;
                left_indices.push(idx as u32);
                right_indices.push(None);
            }
        }
    }

    if unmatched > 0 {
        warn!(
            "{} of {} rows have no match on '{}' (keys are case-sensitive); their joined columns are null",
            unmatched,
            left.num_rows(),
            on
        );
    }

    let num_rows = left_indices.len();
    let left_indices = UInt32Array::from(left_indices);
    let right_indices = UInt32Array::from(right_indices);

    let non_key_names = |batch: &RecordBatch, key_idx: usize| -> HashSet<String> {
        batch
            .schema()
            .fields()
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != key_idx)
            .map(|(_, field)| field.name().clone())
            .collect()
    };
    let left_names = non_key_names(left, left_key_idx);
    let right_names = non_key_names(right, right_key_idx);

    let mut fields: Vec<Field> = Vec::with_capacity(left.num_columns() + right.num_columns());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(left.num_columns() + right.num_columns());

    for (idx, field) in left.schema().fields().iter().enumerate() {
        let name = if idx != left_key_idx && right_names.contains(field.name()) {
            format!("{}_x", field.name())
        } else {
            field.name().clone()
        };
        fields.push(field.as_ref().clone().with_name(name));
        columns.push(take(left.column(idx), &left_indices, None).context("Failed to gather left rows")?);
    }

    for (idx, field) in right.schema().fields().iter().enumerate() {
        if idx == right_key_idx {
            continue;
        }
        let name = if left_names.contains(field.name()) {
            format!("{}_y", field.name())
        } else {
            field.name().clone()
        };
        let mut column =
            take(right.column(idx), &right_indices, None).context("Failed to gather right rows")?;
        if unmatched > 0 && column.data_type() == &DataType::Int64 {
            column = cast(&column, &DataType::Float64)
                .with_context(|| format!("Failed to widen column '{}'", name))?;
        }
        fields.push(
            field
                .as_ref()
                .clone()
                .with_name(name)
                .with_data_type(column.data_type().clone())
                .with_nullable(true),
        );
        columns.push(column);
    }

    debug!(
        "Joined {} left rows with {} right rows into {} rows",
        left.num_rows(),
        right.num_rows(),
        num_rows
    );

    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), columns, &options)
        .context("Failed to assemble joined table")?;

    Ok(JoinOutput { batch, unmatched })
}
