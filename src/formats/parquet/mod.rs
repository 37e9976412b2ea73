//! Parquet file format support.
//!
//! Mirrored datasets may be published as Parquet instead of CSV. The file is
//! decoded into Arrow RecordBatches and its columns normalized to the types
//! the rest of the pipeline works with (Int64, Float64, Utf8, Boolean).

mod reader;

pub use reader::GenericParquetReader;
