//! I/O abstraction layer for reading bytes from different sources

pub mod byte_reader;
pub mod local_reader;
pub mod registry_reader;
pub mod uri;

pub use byte_reader::{ByteReader, read_all};
pub use local_reader::LocalFileByteReader;
pub use registry_reader::{RegistryByteReader, RegistryClient, RegistryCredentials};
pub use uri::{DatasetRef, SourceUri};
