//! File format parsers and readers

pub mod conversion;
pub mod delimited;
pub mod parquet;
pub mod reader;

pub use reader::ReaderFactory;
