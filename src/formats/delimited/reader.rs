use anyhow::{Context, Result, bail};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use crate::config::NA_VALUES;
use crate::formats::conversion::{RawTable, raw_table_to_batch};
use crate::formats::reader::{DelimitedConfig, TableReader};
use crate::io::{ByteReader, read_all};
use crate::schema::TableSchema;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Generic delimited file reader that works with any ByteReader implementation
/// This provides the common parsing logic for CSV and TSV files
pub struct GenericDelimitedReader<R: ByteReader> {
    reader: R,
    config: DelimitedConfig,
}

impl<R: ByteReader> GenericDelimitedReader<R> {
    pub fn new(reader: R, config: DelimitedConfig) -> Self {
        Self { reader, config }
    }

    /// Parse delimited bytes into headers and optional string fields
    ///
    /// The first record is the header. Short rows are padded with nulls, rows
    /// longer than the header are rejected.
    pub fn parse(&self, data: &[u8]) -> Result<RawTable> {
        let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(self.config.delimiter)
            .quote(self.config.quote)
            .has_headers(false) // Header is handled below so it can be mangled
            .flexible(true)
            .from_reader(data);

        let mut records = csv_reader.records();
        let header = match records.next() {
            Some(header) => header.context("Failed to parse header row")?,
            None => bail!("File is empty, expected a header row"),
        };
        let headers = mangle_duplicate_headers(header.iter());

        let mut rows = Vec::new();
        for (row_idx, result) in records.enumerate() {
            let record =
                result.with_context(|| format!("Failed to parse record {}", row_idx + 1))?;

            if record.len() > headers.len() {
                bail!(
                    "Record {} has {} fields, expected at most {}",
                    row_idx + 1,
                    record.len(),
                    headers.len()
                );
            }

            let mut fields: Vec<Option<String>> = record
                .iter()
                .map(|field| (!NA_VALUES.contains(&field)).then(|| field.to_string()))
                .collect();
            fields.resize(headers.len(), None);
            rows.push(fields);
        }

        Ok(RawTable { headers, rows })
    }
}

/// Rename repeated headers `x`, `x` to `x`, `x.1`
fn mangle_duplicate_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut result: Vec<String> = Vec::new();

    for header in headers {
        let mut name = header.to_string();
        while let Some(count) = seen.get_mut(&name) {
            *count += 1;
            name = format!("{}.{}", header, count);
        }
        seen.insert(name.clone(), 0);
        result.push(name);
    }

    result
}

#[async_trait]
impl<R: ByteReader + 'static> TableReader for GenericDelimitedReader<R> {
    async fn read_table(&self, schema: &TableSchema) -> Result<RecordBatch> {
        let data = read_all(&self.reader).await?;
        debug!("Read {} bytes from {}", data.len(), self.reader.describe());

        let raw = self
            .parse(&data)
            .with_context(|| format!("Failed to parse {}", self.reader.describe()))?;

        raw_table_to_batch(&raw, schema)
    }

    fn describe(&self) -> String {
        self.reader.describe()
    }
}
