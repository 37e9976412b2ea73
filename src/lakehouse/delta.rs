//! Transaction-log table storage.
//!
//! A table directory holds Parquet data files plus a `_delta_log/` directory
//! of numbered commits:
//!
//!   {location}/part-00000-{uuid}-c000.snappy.parquet
//!   {location}/_delta_log/00000000000000000000.json
//!   {location}/_delta_log/00000000000000000001.json
//!
//! Each commit is newline-delimited JSON, one action per line. Replaying the
//! commits in order yields the current metadata and the set of active files.

use anyhow::{Context, Result, anyhow, bail};
use arrow::compute::concat_batches;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::Utc;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{DELTA_MIN_READER_VERSION, DELTA_MIN_WRITER_VERSION, PARQUET_ROW_GROUP_SIZE};
use crate::schema::ColumnType;

const LOG_DIR: &str = "_delta_log";

/// One line of a commit file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    CommitInfo(CommitInfo),
    Protocol(Protocol),
    MetaData(Metadata),
    Add(AddFile),
    Remove(RemoveFile),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub timestamp: i64,
    pub operation: String,
    pub operation_parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub min_reader_version: u32,
    pub min_writer_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageFormat {
    pub provider: String,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Stable table id; survives overwrites
    pub id: String,
    pub format: StorageFormat,
    /// JSON-encoded [`StructType`]
    pub schema_string: String,
    pub partition_columns: Vec<String>,
    pub configuration: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFile {
    /// Path relative to the table location
    pub path: String,
    pub partition_values: BTreeMap<String, String>,
    pub size: u64,
    pub modification_time: i64,
    pub data_change: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFile {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<i64>,
    pub data_change: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileStats {
    num_records: usize,
}

/// Table schema as recorded in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructType {
    #[serde(rename = "type")]
    pub type_name: String,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl StructType {
    pub fn from_arrow(schema: &Schema) -> Result<Self> {
        let fields = schema
            .fields()
            .iter()
            .map(|field| {
                let column_type = ColumnType::from_data_type(field.data_type()).ok_or_else(|| {
                    anyhow!(
                        "Column '{}' has type {} which cannot be stored",
                        field.name(),
                        field.data_type()
                    )
                })?;
                Ok(StructField {
                    name: field.name().clone(),
                    data_type: column_type.delta_type_name().to_string(),
                    nullable: field.is_nullable(),
                    metadata: BTreeMap::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            type_name: "struct".to_string(),
            fields,
        })
    }

    pub fn to_arrow(&self) -> Result<Schema> {
        let fields = self
            .fields
            .iter()
            .map(|field| {
                let column_type = ColumnType::from_delta_type_name(&field.data_type)
                    .ok_or_else(|| anyhow!("Unsupported column type '{}'", field.data_type))?;
                Ok(Field::new(
                    &field.name,
                    column_type.data_type(),
                    field.nullable,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Schema::new(fields))
    }
}

/// Options of an overwrite; every write replaces all active files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// Allow the table schema to be replaced
    pub overwrite_schema: bool,
}

impl WriteOptions {
    /// Full overwrite with schema replacement allowed
    pub fn full_overwrite() -> Self {
        Self {
            overwrite_schema: true,
        }
    }
}

/// State of a table at one version
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    pub protocol: Protocol,
    pub metadata: Metadata,
    /// Active files in the order they were added
    pub files: Vec<AddFile>,
}

impl Snapshot {
    pub fn schema(&self) -> Result<StructType> {
        serde_json::from_str(&self.metadata.schema_string)
            .context("Failed to parse table schema from log")
    }

    fn apply(state: &mut Option<Self>, version: u64, actions: Vec<Action>) -> Result<()> {
        let mut protocol = state.as_ref().map(|s| s.protocol.clone());
        let mut metadata = state.as_ref().map(|s| s.metadata.clone());
        let mut files = state.take().map(|s| s.files).unwrap_or_default();

        for action in actions {
            match action {
                Action::Protocol(p) => protocol = Some(p),
                Action::MetaData(m) => metadata = Some(m),
                Action::Add(add) => {
                    files.retain(|f| f.path != add.path);
                    files.push(add);
                }
                Action::Remove(remove) => files.retain(|f| f.path != remove.path),
                Action::CommitInfo(_) => {}
            }
        }

        *state = Some(Self {
            version,
            protocol: protocol.ok_or_else(|| anyhow!("Commit {} has no protocol", version))?,
            metadata: metadata.ok_or_else(|| anyhow!("Commit {} has no metadata", version))?,
            files,
        });
        Ok(())
    }
}

/// Outcome of a committed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub version: u64,
    pub rows: usize,
    pub files_added: usize,
    pub files_removed: usize,
    pub schema_changed: bool,
}

/// A table stored as Parquet files plus a transaction log
pub struct DeltaTable {
    location: PathBuf,
}

impl DeltaTable {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    fn log_dir(&self) -> PathBuf {
        self.location.join(LOG_DIR)
    }

    fn commit_path(&self, version: u64) -> PathBuf {
        self.log_dir().join(format!("{:020}.json", version))
    }

    /// Committed versions in ascending order
    async fn list_versions(&self) -> Result<Vec<u64>> {
        let log_dir = self.log_dir();
        if !fs::try_exists(&log_dir)
            .await
            .context("Failed to check transaction log existence")?
        {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        let mut entries = fs::read_dir(&log_dir)
            .await
            .with_context(|| format!("Failed to list {}", log_dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            if let Some(stem) = file_name.to_str().and_then(|n| n.strip_suffix(".json"))
                && stem.len() == 20
                && let Ok(version) = stem.parse::<u64>()
            {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    async fn read_commit(&self, version: u64) -> Result<Vec<Action>> {
        let path = self.commit_path(version);
        let contents = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read commit {}", path.display()))?;

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .with_context(|| format!("Failed to parse action in commit {}", version))
            })
            .collect()
    }

    /// Replay the log; `None` when the table has no commits
    pub async fn snapshot(&self) -> Result<Option<Snapshot>> {
        let mut state = None;
        for version in self.list_versions().await? {
            let actions = self.read_commit(version).await?;
            Snapshot::apply(&mut state, version, actions)?;
        }
        Ok(state)
    }

    /// Write `batch` as one data file and commit it
    pub async fn write(&self, batch: &RecordBatch, options: &WriteOptions) -> Result<CommitSummary> {
        let snapshot = self.snapshot().await?;
        let schema = StructType::from_arrow(&batch.schema())?;

        let schema_changed = match &snapshot {
            Some(existing) => existing.schema()? != schema,
            None => false,
        };
        if schema_changed && !options.overwrite_schema {
            bail!(
                "Schema of the incoming data differs from the schema of {} and overwrite-schema is not enabled",
                self.location.display()
            );
        }

        let now = Utc::now().timestamp_millis();
        let version = snapshot.as_ref().map_or(0, |s| s.version + 1);

        // 1. Data file
        let file_name = format!("part-00000-{}-c000.snappy.parquet", Uuid::new_v4());
        let data = encode_parquet(batch)?;
        fs::create_dir_all(&self.location)
            .await
            .with_context(|| format!("Failed to create {}", self.location.display()))?;
        fs::write(self.location.join(&file_name), &data)
            .await
            .with_context(|| format!("Failed to write data file {}", file_name))?;

        // 2. Actions
        let mut actions = vec![Action::CommitInfo(CommitInfo {
            timestamp: now,
            operation: "WRITE".to_string(),
            operation_parameters: BTreeMap::from([
                ("mode".to_string(), "Overwrite".to_string()),
                ("partitionBy".to_string(), "[]".to_string()),
                (
                    "overwriteSchema".to_string(),
                    options.overwrite_schema.to_string(),
                ),
            ]),
            engine_info: Some(crate::config::REGISTRY_USER_AGENT.to_string()),
        })];

        if snapshot.is_none() {
            actions.push(Action::Protocol(Protocol {
                min_reader_version: DELTA_MIN_READER_VERSION,
                min_writer_version: DELTA_MIN_WRITER_VERSION,
            }));
        }

        if snapshot.is_none() || schema_changed {
            let id = snapshot
                .as_ref()
                .map(|s| s.metadata.id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            actions.push(Action::MetaData(Metadata {
                id,
                format: StorageFormat {
                    provider: "parquet".to_string(),
                    options: BTreeMap::new(),
                },
                schema_string: serde_json::to_string(&schema)
                    .context("Failed to serialize table schema")?,
                partition_columns: Vec::new(),
                configuration: BTreeMap::new(),
                created_time: Some(now),
            }));
        }

        let mut files_removed = 0;
        if let Some(existing) = &snapshot {
            for file in &existing.files {
                actions.push(Action::Remove(RemoveFile {
                    path: file.path.clone(),
                    deletion_timestamp: Some(now),
                    data_change: true,
                    size: Some(file.size),
                }));
                files_removed += 1;
            }
        }

        actions.push(Action::Add(AddFile {
            path: file_name.clone(),
            partition_values: BTreeMap::new(),
            size: data.len() as u64,
            modification_time: now,
            data_change: true,
            stats: Some(serde_json::to_string(&FileStats {
                num_records: batch.num_rows(),
            })?),
        }));

        // 3. Commit
        if let Err(e) = self.commit(version, &actions).await {
            // The data file is unreferenced without its commit
            let _ = fs::remove_file(self.location.join(&file_name)).await;
            return Err(e);
        }

        info!(
            "Committed version {} of {} ({} rows, {} files removed)",
            version,
            self.location.display(),
            batch.num_rows(),
            files_removed
        );

        Ok(CommitSummary {
            version,
            rows: batch.num_rows(),
            files_added: 1,
            files_removed,
            schema_changed,
        })
    }

    /// Create the commit file for `version`; fails if it already exists
    async fn commit(&self, version: u64, actions: &[Action]) -> Result<()> {
        let mut contents = String::new();
        for action in actions {
            contents.push_str(&serde_json::to_string(action).context("Failed to serialize action")?);
            contents.push('\n');
        }

        fs::create_dir_all(self.log_dir())
            .await
            .context("Failed to create transaction log directory")?;

        let path = self.commit_path(version);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                file.write_all(contents.as_bytes())
                    .await
                    .context("Failed to write commit file")?;
                file.flush().await.context("Failed to flush commit file")?;
                debug!("Wrote {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(anyhow!(
                "Version {} of {} was committed by another writer",
                version,
                self.location.display()
            )),
            Err(e) => Err(e).context("Failed to create commit file"),
        }
    }

    /// Read the current version into memory; `None` when the table has no commits
    pub async fn read(&self) -> Result<Option<RecordBatch>> {
        let Some(snapshot) = self.snapshot().await? else {
            return Ok(None);
        };
        let schema = Arc::new(snapshot.schema()?.to_arrow()?);

        let mut batches = Vec::new();
        for file in &snapshot.files {
            let path = self.location.join(&file.path);
            let data = fs::read(&path)
                .await
                .with_context(|| format!("Failed to read data file {}", path.display()))?;
            let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(data))
                .with_context(|| format!("Failed to open data file {}", path.display()))?
                .build()?;
            for batch in reader {
                batches.push(batch.context("Failed to decode data file")?);
            }
        }

        let batch = concat_batches(&schema, &batches).context("Failed to combine data files")?;
        Ok(Some(batch))
    }
}

fn encode_parquet(batch: &RecordBatch) -> Result<Vec<u8>> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(PARQUET_ROW_GROUP_SIZE)
        .build();

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))
        .context("Failed to create Parquet writer")?;
    writer.write(batch).context("Failed to encode data file")?;
    writer.close().context("Failed to finish data file")?;
    Ok(buffer)
}
