//! Client for the external dataset registry.
//!
//! Files are addressed as `<owner>/<dataset>/<file>` and downloaded whole over
//! HTTPS. The registry serves single files either raw or wrapped in a zip
//! archive; archives are unpacked transparently.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use super::byte_reader::ByteReader;
use super::uri::DatasetRef;
use crate::config::{REGISTRY_TIMEOUT, REGISTRY_USER_AGENT};
use crate::error::PipelineError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// API credentials for the registry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryCredentials {
    pub username: String,
    pub key: String,
}

impl RegistryCredentials {
    /// Resolve credentials from `KAGGLE_USERNAME`/`KAGGLE_KEY`, falling back to
    /// `kaggle.json` in `$KAGGLE_CONFIG_DIR` or `~/.kaggle`
    pub fn discover() -> Result<Option<Self>> {
        if let (Ok(username), Ok(key)) = (
            std::env::var("KAGGLE_USERNAME"),
            std::env::var("KAGGLE_KEY"),
        ) {
            return Ok(Some(Self { username, key }));
        }

        let Some(path) = Self::config_file_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let credentials = Self::from_json(&contents)
            .with_context(|| format!("Invalid credentials file {}", path.display()))?;
        Ok(Some(credentials))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse registry credentials")
    }

    fn config_file_path() -> Option<PathBuf> {
        let dir = match std::env::var_os("KAGGLE_CONFIG_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => directories::BaseDirs::new()?.home_dir().join(".kaggle"),
        };
        Some(dir.join("kaggle.json"))
    }
}

/// HTTP client for the dataset registry
#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Option<RegistryCredentials>,
}

impl RegistryClient {
    pub fn new(base_url: &str, credentials: Option<RegistryCredentials>) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid registry URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("Registry URL cannot be a base: {}", base_url));
        }

        let http = reqwest::Client::builder()
            .timeout(REGISTRY_TIMEOUT)
            .user_agent(REGISTRY_USER_AGENT)
            .build()
            .context("Failed to build registry HTTP client")?;

        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    /// Download URL of a single dataset file
    pub fn download_url(&self, dataset: &DatasetRef) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["datasets", "download", &dataset.owner, &dataset.dataset])
                .extend(dataset.file.split('/'));
        }
        url
    }

    /// Download a dataset file, unpacking it if the registry zipped it
    pub async fn download(&self, dataset: &DatasetRef) -> Result<Bytes> {
        let url = self.download_url(dataset);
        info!("Fetching {} from {}", dataset, url);

        let fetch_error =
            |e: anyhow::Error| PipelineError::registry_fetch(dataset.handle(), &dataset.file, e);

        let mut request = self.http.get(url.clone());
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.key));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))
            .map_err(fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            let reason = match status.as_u16() {
                401 | 403 => "registry rejected the credentials",
                404 => "dataset or file not found",
                _ => "registry returned an error",
            };
            return Err(fetch_error(anyhow!("{} (HTTP {})", reason, status)).into());
        }

        let body = response
            .bytes()
            .await
            .context("Failed to read registry response body")
            .map_err(fetch_error)?;
        debug!("Downloaded {} bytes for {}", body.len(), dataset);

        if body.starts_with(ZIP_MAGIC) {
            return extract_from_zip(body, &dataset.file).map_err(|e| fetch_error(e).into());
        }
        Ok(body)
    }
}

/// Upper bound of the decompressed size reserved up front, relative to the
/// archive size; larger entries grow the buffer as they are read
const MAX_PREALLOC_RATIO: usize = 4;

/// Buffer capacity for an entry whose header claims `declared_size` bytes
fn entry_capacity(declared_size: u64, archive_len: usize) -> usize {
    let declared = usize::try_from(declared_size).unwrap_or(usize::MAX);
    declared.min(archive_len.saturating_mul(MAX_PREALLOC_RATIO))
}

/// Pull `file_name` out of a zip archive
///
/// Falls back to the only entry of single-entry archives, then to an entry
/// whose name ends with the requested base name.
pub fn extract_from_zip(archive_bytes: Bytes, file_name: &str) -> Result<Bytes> {
    let archive_len = archive_bytes.len();
    let mut archive =
        zip::ZipArchive::new(Cursor::new(archive_bytes)).context("Failed to open zip archive")?;

    let base_name = file_name.rsplit('/').next().unwrap_or(file_name);
    let index = match archive.index_for_name(file_name) {
        Some(index) => index,
        None if archive.len() == 1 => 0,
        None => (0..archive.len())
            .find(|&i| {
                archive
                    .name_for_index(i)
                    .is_some_and(|name| name.rsplit('/').next() == Some(base_name))
            })
            .ok_or_else(|| anyhow!("Archive does not contain '{}'", file_name))?,
    };

    let mut entry = archive
        .by_index(index)
        .context("Failed to open archive entry")?;
    let mut contents = Vec::with_capacity(entry_capacity(entry.size(), archive_len));
    entry
        .read_to_end(&mut contents)
        .context("Failed to decompress archive entry")?;

    Ok(Bytes::from(contents))
}

/// ByteReader over a registry file, downloaded once on first access
pub struct RegistryByteReader {
    client: RegistryClient,
    dataset: DatasetRef,
    content: OnceCell<Bytes>,
}

impl RegistryByteReader {
    pub fn new(client: RegistryClient, dataset: DatasetRef) -> Self {
        Self {
            client,
            dataset,
            content: OnceCell::new(),
        }
    }

    async fn content(&self) -> Result<&Bytes> {
        self.content
            .get_or_try_init(|| self.client.download(&self.dataset))
            .await
    }
}

#[async_trait]
impl ByteReader for RegistryByteReader {
    async fn size(&self) -> Result<u64> {
        Ok(self.content().await?.len() as u64)
    }

    async fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        let content = self.content().await?;
        let start = std::cmp::min(start as usize, content.len());
        let end = std::cmp::min(end as usize, content.len());
        Ok(content[start..end].to_vec())
    }

    fn describe(&self) -> String {
        self.dataset.to_uri()
    }
}
