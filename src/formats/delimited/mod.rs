//! Delimited (CSV, TSV) file support

pub mod reader;
