//! Local lakehouse: managed tables, file datasets and their catalog.
//!
//! Directory structure:
//!   {root}/Tables/{schema}/{table}/   managed tables
//!   {root}/Files/...                  file datasets
//!   {root}/_catalog/                  schema and table entries
//!
//! Managed tables and file datasets share the transaction-log layout of
//! [`delta::DeltaTable`]; only managed tables are registered in the catalog.

pub mod catalog;
pub mod delta;

use anyhow::{Context, Result, anyhow, bail};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

pub use catalog::{Catalog, ColumnEntry, LocalCatalog, SchemaStatus, TableEntry};
pub use delta::{CommitSummary, DeltaTable, StructType, WriteOptions};

use crate::error::PipelineError;

const TABLES_DIR: &str = "Tables";
const CATALOG_DIR: &str = "_catalog";

pub struct Lakehouse {
    root: PathBuf,
    catalog: Arc<dyn Catalog>,
}

impl Lakehouse {
    /// Open (and create if needed) a lakehouse with a local catalog
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create lakehouse root {}", root.display()))?;

        let catalog = Arc::new(LocalCatalog::new(root.join(CATALOG_DIR)));
        Ok(Self::with_catalog(root, catalog))
    }

    pub fn with_catalog(root: PathBuf, catalog: Arc<dyn Catalog>) -> Self {
        Self { root, catalog }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_relative_path(schema: &str, table: &str) -> String {
        format!("{}/{}/{}", TABLES_DIR, schema, table)
    }

    /// Resolve a lakehouse-relative path such as `Files/DragonBall/x`
    pub fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            bail!("Path '{}' must be relative to the lakehouse root", path);
        }
        Ok(self.root.join(relative))
    }

    pub async fn create_schema_if_not_exists(&self, schema: &str) -> Result<SchemaStatus> {
        let status = self.catalog.create_schema(schema).await?;
        match status {
            SchemaStatus::Created => info!("Created schema {}", schema),
            SchemaStatus::AlreadyExists => info!("Schema {} already exists", schema),
        }
        Ok(status)
    }

    /// Write a managed table and register it in the catalog
    pub async fn save_as_table(
        &self,
        batch: &RecordBatch,
        schema: &str,
        table: &str,
        options: &WriteOptions,
    ) -> Result<CommitSummary> {
        let target = format!("managed table {}.{}", schema, table);
        let summary = self
            .write_managed_table(batch, schema, table, options)
            .await
            .map_err(|e| PipelineError::write_failure(&target, e))?;
        Ok(summary)
    }

    async fn write_managed_table(
        &self,
        batch: &RecordBatch,
        schema: &str,
        table: &str,
        options: &WriteOptions,
    ) -> Result<CommitSummary> {
        catalog::validate_identifier(table)?;
        if !self.catalog.schema_exists(schema).await? {
            bail!("Schema '{}' does not exist", schema);
        }

        let location = Self::table_relative_path(schema, table);
        let summary = DeltaTable::new(self.root.join(&location))
            .write(batch, options)
            .await?;

        let columns = StructType::from_arrow(&batch.schema())?
            .fields
            .into_iter()
            .map(|field| ColumnEntry {
                name: field.name,
                col_type: field.data_type,
            })
            .collect();

        let now = Utc::now();
        self.catalog
            .upsert_table(TableEntry {
                schema: schema.to_string(),
                name: table.to_string(),
                location,
                format: "delta".to_string(),
                columns,
                version: summary.version,
                created_at: now,
                updated_at: now,
            })
            .await?;

        Ok(summary)
    }

    /// Write a file dataset at a lakehouse-relative path
    pub async fn save(
        &self,
        batch: &RecordBatch,
        path: &str,
        options: &WriteOptions,
    ) -> Result<CommitSummary> {
        let target = format!("file dataset {}", path);
        let result = async {
            let location = self.resolve_path(path)?;
            DeltaTable::new(location).write(batch, options).await
        }
        .await;
        result.map_err(|e| PipelineError::write_failure(&target, e).into())
    }

    pub async fn read_table(&self, schema: &str, table: &str) -> Result<RecordBatch> {
        let Some(entry) = self.catalog.get_table(schema, table).await? else {
            let registered: Vec<String> = self
                .catalog
                .list_tables(schema)
                .await?
                .iter()
                .map(TableEntry::qualified_name)
                .collect();
            bail!(
                "Table {}.{} is not registered; registered tables: {:?}",
                schema,
                table,
                registered
            );
        };

        DeltaTable::new(self.root.join(&entry.location))
            .read()
            .await?
            .ok_or_else(|| anyhow!("Table {} has no committed data", entry.qualified_name()))
    }

    pub async fn read_path(&self, path: &str) -> Result<RecordBatch> {
        DeltaTable::new(self.resolve_path(path)?)
            .read()
            .await?
            .ok_or_else(|| anyhow!("No dataset at {}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, StringArray};
    use tempfile::TempDir;

    fn names(values: &[&str]) -> RecordBatch {
        RecordBatch::try_from_iter(vec![(
            "name",
            Arc::new(StringArray::from(values.to_vec())) as ArrayRef,
        )])
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_as_table_registers_entry() {
        let dir = TempDir::new().unwrap();
        let lakehouse = Lakehouse::open(dir.path()).await.unwrap();

        lakehouse.create_schema_if_not_exists("bronze").await.unwrap();
        let summary = lakehouse
            .save_as_table(&names(&["Goku"]), "bronze", "chars", &WriteOptions::full_overwrite())
            .await
            .unwrap();
        assert_eq!(summary.version, 0);

        let entry = LocalCatalog::new(dir.path().join(CATALOG_DIR))
            .get_table("bronze", "chars")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.location, "Tables/bronze/chars");
        assert_eq!(entry.columns[0].col_type, "string");
        assert!(dir.path().join("Tables/bronze/chars/_delta_log").is_dir());

        let read = lakehouse.read_table("bronze", "chars").await.unwrap();
        assert_eq!(read, names(&["Goku"]));
    }

    #[tokio::test]
    async fn test_save_as_table_without_schema_is_write_failure() {
        let dir = TempDir::new().unwrap();
        let lakehouse = Lakehouse::open(dir.path()).await.unwrap();

        let err = lakehouse
            .save_as_table(&names(&["Goku"]), "missing", "chars", &WriteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::WriteFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_file_dataset() {
        let dir = TempDir::new().unwrap();
        let lakehouse = Lakehouse::open(dir.path()).await.unwrap();

        lakehouse
            .save(&names(&["Piccolo"]), "Files/DragonBall/chars", &WriteOptions::full_overwrite())
            .await
            .unwrap();
        let read = lakehouse.read_path("Files/DragonBall/chars").await.unwrap();
        assert_eq!(read.num_rows(), 1);
    }

    #[tokio::test]
    async fn test_save_rejects_escaping_path() {
        let dir = TempDir::new().unwrap();
        let lakehouse = Lakehouse::open(dir.path()).await.unwrap();

        let err = lakehouse
            .save(&names(&["Goku"]), "../outside", &WriteOptions::default())
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<PipelineError>().is_some());
        assert!(lakehouse.resolve_path("/abs").is_err());
        assert!(lakehouse.resolve_path("").is_err());
    }

    #[tokio::test]
    async fn test_read_unregistered_table() {
        let dir = TempDir::new().unwrap();
        let lakehouse = Lakehouse::open(dir.path()).await.unwrap();
        assert!(lakehouse.read_table("bronze", "chars").await.is_err());
    }
}
