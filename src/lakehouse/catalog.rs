use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Outcome of a schema creation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    Created,
    /// Another run created it first; not an error
    AlreadyExists,
}

/// Catalog entry for a schema (namespace of managed tables)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Column of a managed table (JSON serialization format)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: String,
}

/// Catalog entry for a managed table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    pub schema: String,
    pub name: String,
    /// Table directory relative to the lakehouse root
    pub location: String,
    pub format: String,
    pub columns: Vec<ColumnEntry>,
    /// Latest committed log version
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TableEntry {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Registry of schemas and managed tables
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Create a schema atomically
    /// Returns `AlreadyExists` instead of failing when it is present
    async fn create_schema(&self, name: &str) -> Result<SchemaStatus>;

    async fn schema_exists(&self, name: &str) -> Result<bool>;

    /// Insert or replace a table entry, keeping the original creation time
    async fn upsert_table(&self, entry: TableEntry) -> Result<TableEntry>;

    async fn get_table(&self, schema: &str, table: &str) -> Result<Option<TableEntry>>;

    /// Tables of a schema, sorted by name
    async fn list_tables(&self, schema: &str) -> Result<Vec<TableEntry>>;
}

/// Catalog backed by JSON files
///
/// Directory structure:
///   {base_dir}/schemas/{schema}.json
///   {base_dir}/tables/{schema}/{table}.json
pub struct LocalCatalog {
    base_dir: PathBuf,
}

impl LocalCatalog {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn schema_path(&self, name: &str) -> PathBuf {
        self.base_dir.join("schemas").join(format!("{}.json", name))
    }

    fn tables_dir(&self, schema: &str) -> PathBuf {
        self.base_dir.join("tables").join(schema)
    }

    fn table_path(&self, schema: &str, table: &str) -> PathBuf {
        self.tables_dir(schema).join(format!("{}.json", table))
    }
}

/// Reject names that would escape the catalog directory
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', ':'])
        || name.chars().any(char::is_control)
    {
        bail!("Invalid identifier '{}'", name);
    }
    Ok(())
}

async fn read_entry<T: for<'de> Deserialize<'de>>(path: &PathBuf) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(contents) => {
            let entry = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse catalog entry {}", path.display()))?;
            Ok(Some(entry))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read catalog entry {}", path.display())),
    }
}

#[async_trait]
impl Catalog for LocalCatalog {
    async fn create_schema(&self, name: &str) -> Result<SchemaStatus> {
        validate_identifier(name)?;
        let path = self.schema_path(name);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create catalog directory")?;
        }

        let entry = SchemaEntry {
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&entry).context("Failed to serialize schema")?;

        // create_new makes concurrent creation resolve to exactly one winner
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                file.write_all(json.as_bytes())
                    .await
                    .context("Failed to write schema entry")?;
                file.flush().await.context("Failed to flush schema entry")?;
                Ok(SchemaStatus::Created)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(SchemaStatus::AlreadyExists),
            Err(e) => Err(e).context("Failed to create schema entry"),
        }
    }

    async fn schema_exists(&self, name: &str) -> Result<bool> {
        validate_identifier(name)?;
        fs::try_exists(self.schema_path(name))
            .await
            .context("Failed to check schema existence")
    }

    async fn upsert_table(&self, mut entry: TableEntry) -> Result<TableEntry> {
        validate_identifier(&entry.schema)?;
        validate_identifier(&entry.name)?;

        let path = self.table_path(&entry.schema, &entry.name);
        if let Some(existing) = read_entry::<TableEntry>(&path).await? {
            entry.created_at = existing.created_at;
        }

        fs::create_dir_all(self.tables_dir(&entry.schema))
            .await
            .context("Failed to create catalog directory")?;
        let json = serde_json::to_string_pretty(&entry).context("Failed to serialize table")?;
        fs::write(&path, json)
            .await
            .context("Failed to write table entry")?;

        Ok(entry)
    }

    async fn get_table(&self, schema: &str, table: &str) -> Result<Option<TableEntry>> {
        validate_identifier(schema)?;
        validate_identifier(table)?;
        read_entry(&self.table_path(schema, table)).await
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<TableEntry>> {
        validate_identifier(schema)?;
        let dir = self.tables_dir(schema);
        if !fs::try_exists(&dir)
            .await
            .context("Failed to check catalog directory")?
        {
            return Ok(Vec::new());
        }

        let mut tables = Vec::new();
        let mut entries = fs::read_dir(&dir)
            .await
            .context("Failed to list catalog directory")?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(table) = read_entry::<TableEntry>(&path).await?
            {
                tables.push(table);
            }
        }
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }
}
