use anyhow::{Result, ensure};
use async_trait::async_trait;
use bytes::Bytes;

/// Abstraction for byte-level I/O operations
/// This trait enables reading dataset files from different sources (local
/// files, the dataset registry) with a unified interface
#[async_trait]
pub trait ByteReader: Send + Sync {
    /// Get the total size of the file/object in bytes
    async fn size(&self) -> Result<u64>;

    /// Read a range of bytes from the file/object
    /// Returns the bytes read (may be less than requested if EOF is reached)
    async fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>>;

    /// Human readable location, used in log lines and error messages
    fn describe(&self) -> String;
}

/// Read a whole file/object into memory
pub async fn read_all(reader: &dyn ByteReader) -> Result<Bytes> {
    let size = reader.size().await?;
    if size == 0 {
        return Ok(Bytes::new());
    }

    let buffer = reader.read_range(0, size).await?;
    ensure!(
        buffer.len() as u64 == size,
        "Short read from {}: expected {} bytes, got {}",
        reader.describe(),
        size,
        buffer.len()
    );

    Ok(Bytes::from(buffer))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory ByteReader for testing
    pub(crate) struct MockByteReader {
        pub data: Vec<u8>,
    }

    #[async_trait]
    impl ByteReader for MockByteReader {
        async fn size(&self) -> Result<u64> {
            Ok(self.data.len() as u64)
        }

        async fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>> {
            let start = start as usize;
            let end = std::cmp::min(end as usize, self.data.len());
            Ok(self.data[start..end].to_vec())
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    /// Reader that claims more bytes than it can deliver
    struct TruncatedByteReader;

    #[async_trait]
    impl ByteReader for TruncatedByteReader {
        async fn size(&self) -> Result<u64> {
            Ok(10)
        }

        async fn read_range(&self, _start: u64, _end: u64) -> Result<Vec<u8>> {
            Ok(b"abc".to_vec())
        }

        fn describe(&self) -> String {
            "truncated".to_string()
        }
    }

    #[tokio::test]
    async fn test_read_all() {
        let reader = MockByteReader {
            data: b"name,speed\nGoku,90\n".to_vec(),
        };

        let bytes = read_all(&reader).await.unwrap();
        assert_eq!(&bytes[..], b"name,speed\nGoku,90\n");
    }

    #[tokio::test]
    async fn test_read_all_empty() {
        let reader = MockByteReader { data: Vec::new() };
        let bytes = read_all(&reader).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_read_all_short_read() {
        let err = read_all(&TruncatedByteReader).await.unwrap_err();
        assert!(err.to_string().contains("Short read from truncated"));
    }
}
