use anyhow::{Result, anyhow};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::sync::Arc;

use super::delimited::reader::GenericDelimitedReader;
use super::parquet::GenericParquetReader;
use crate::io::{ByteReader, LocalFileByteReader, RegistryByteReader, RegistryClient, SourceUri};
use crate::schema::TableSchema;

/// Trait for decoding a whole dataset file into an in-memory table
#[async_trait]
pub trait TableReader: Send + Sync {
    /// Read the file and build a table, parsing declared columns with the
    /// types `schema` gives them
    async fn read_table(&self, schema: &TableSchema) -> Result<RecordBatch>;

    /// Location of the underlying file
    fn describe(&self) -> String;
}

/// Configuration for delimited file reading (CSV, TSV)
#[derive(Debug, Clone)]
pub struct DelimitedConfig {
    pub delimiter: u8,
    pub quote: u8,
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

impl DelimitedConfig {
    pub fn csv() -> Self {
        Self::default()
    }

    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            quote: b'"',
        }
    }
}

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Tsv,
    Parquet,
}

impl Format {
    /// Auto-detect file format from a file name
    pub fn detect(file_name: &str) -> Result<Self> {
        let lower = file_name.to_lowercase();

        if lower.ends_with(".csv") {
            Ok(Format::Csv)
        } else if lower.ends_with(".tsv") {
            Ok(Format::Tsv)
        } else if lower.ends_with(".parquet") {
            Ok(Format::Parquet)
        } else {
            Err(anyhow!(
                "Could not detect format from file '{}'. Supported extensions: .csv, .tsv, .parquet",
                file_name
            ))
        }
    }
}

/// Factory for creating TableReader instances based on URI and format
pub struct ReaderFactory {
    registry: RegistryClient,
}

impl ReaderFactory {
    pub fn new(registry: RegistryClient) -> Self {
        Self { registry }
    }

    /// Create a TableReader for a source URI, detecting the format from its
    /// file name
    pub fn create_reader(&self, source_uri: &SourceUri) -> Result<Arc<dyn TableReader>> {
        let format = Format::detect(&source_uri.file_name())?;

        match source_uri {
            SourceUri::Local(path) => Ok(with_format(LocalFileByteReader::new(path), format)),

            SourceUri::Registry(dataset) => {
                let byte_reader = RegistryByteReader::new(self.registry.clone(), dataset.clone());
                Ok(with_format(byte_reader, format))
            }
        }
    }
}

fn with_format<R: ByteReader + 'static>(byte_reader: R, format: Format) -> Arc<dyn TableReader> {
    match format {
        Format::Csv => Arc::new(GenericDelimitedReader::new(byte_reader, DelimitedConfig::csv())),
        Format::Tsv => Arc::new(GenericDelimitedReader::new(byte_reader, DelimitedConfig::tsv())),
        Format::Parquet => Arc::new(GenericParquetReader::new(byte_reader)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::REGISTRY_BASE_URL;
    use std::io::Write;

    fn factory() -> ReaderFactory {
        ReaderFactory::new(RegistryClient::new(REGISTRY_BASE_URL, None).unwrap())
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(Format::detect("dragon_ball_z.csv").unwrap(), Format::Csv);
        assert_eq!(Format::detect("CHARS.TSV").unwrap(), Format::Tsv);
        assert_eq!(Format::detect("chars.parquet").unwrap(), Format::Parquet);
        assert!(Format::detect("chars.xlsx").is_err());
    }

    #[tokio::test]
    async fn test_factory_reads_local_csv() {
        let mut temp_file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(temp_file, "name,ki,maxKi,race,gender,description,image,affiliation").unwrap();
        writeln!(temp_file, "Goku,60.000.000,90 Septillion,Saiyan,Male,Hero,goku.png,Z Fighter").unwrap();
        temp_file.flush().unwrap();

        let uri = SourceUri::parse(temp_file.path().to_str().unwrap()).unwrap();
        let reader = factory().create_reader(&uri).unwrap();
        let table = reader
            .read_table(&TableSchema::character_info())
            .await
            .unwrap();

        assert_eq!(table.num_rows(), 1);
        assert_eq!(table.num_columns(), 8);
    }

    #[test]
    fn test_factory_rejects_unknown_extension() {
        let uri = SourceUri::parse("kaggle://owner/slug/chars.json").unwrap();
        assert!(factory().create_reader(&uri).is_err());
    }
}
