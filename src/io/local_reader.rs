use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, BufReader};

use super::byte_reader::ByteReader;

/// ByteReader implementation for local files
#[derive(Clone)]
pub struct LocalFileByteReader {
    file_path: PathBuf,
}

impl LocalFileByteReader {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ByteReader for LocalFileByteReader {
    async fn size(&self) -> Result<u64> {
        let metadata = tokio::fs::metadata(&self.file_path)
            .await
            .with_context(|| format!("Failed to open {}", self.file_path.display()))?;
        Ok(metadata.len())
    }

    async fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        let file = File::open(&self.file_path)
            .await
            .with_context(|| format!("Failed to open {} for reading", self.file_path.display()))?;

        let mut file = BufReader::new(file);
        file.seek(std::io::SeekFrom::Start(start)).await?;

        let mut buffer = Vec::with_capacity((end - start) as usize);
        file.take(end - start).read_to_end(&mut buffer).await?;

        Ok(buffer)
    }

    fn describe(&self) -> String {
        self.file_path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_local_read_range() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "name,race\nGoku,Saiyan\n").unwrap();
        temp_file.flush().unwrap();

        let reader = LocalFileByteReader::new(temp_file.path());
        assert_eq!(reader.size().await.unwrap(), 22);
        assert_eq!(reader.read_range(10, 14).await.unwrap(), b"Goku");
        // Past EOF returns what is available
        assert_eq!(reader.read_range(15, 100).await.unwrap(), b"Saiyan\n");
    }

    #[tokio::test]
    async fn test_local_missing_file() {
        let reader = LocalFileByteReader::new("/nonexistent/dragon_ball_z.csv");
        let err = reader.size().await.unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/dragon_ball_z.csv"));
    }
}
