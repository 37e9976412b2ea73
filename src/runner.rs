//! High-level runner API for the bronze pipeline.
//!
//! This module provides the public entry points used by the CLI: running the
//! pipeline end to end and reading persisted outputs back for inspection.

use anyhow::Result;
use arrow::record_batch::RecordBatch;
use derive_builder::Builder;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::{
    FILE_DATASET_PATH, INFO_DATASET, REGISTRY_BASE_URL, STATS_DATASET, TARGET_SCHEMA, TARGET_TABLE,
};
use crate::io::DatasetRef;
use crate::lakehouse::Lakehouse;
use crate::pipeline::{Pipeline, PipelineContext};

pub use crate::error::PipelineError;
pub use crate::lakehouse::{CommitSummary, SchemaStatus};
pub use crate::pipeline::{preview, preview_rows};
pub use crate::telemetry::RunStats;

/// Configuration of one pipeline run
///
/// Sources default to the two registry datasets and targets to the bronze
/// lakehouse identifiers; only the lakehouse root is required.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct PipelineConfig {
    pub lakehouse_root: PathBuf,

    #[builder(default = "DatasetRef::from(STATS_DATASET).to_uri()")]
    pub stats_uri: String,

    #[builder(default = "DatasetRef::from(INFO_DATASET).to_uri()")]
    pub info_uri: String,

    #[builder(default = "TARGET_SCHEMA.to_string()")]
    pub target_schema: String,

    #[builder(default = "TARGET_TABLE.to_string()")]
    pub target_table: String,

    #[builder(default = "FILE_DATASET_PATH.to_string()")]
    pub file_dataset_path: String,

    #[builder(default = "REGISTRY_BASE_URL.to_string()")]
    pub registry_base_url: String,
}

impl PipelineConfig {
    /// Human-readable plan, printed by dry runs
    pub fn plan(&self) -> Vec<String> {
        vec![
            format!("Load CharacterStats from {}", self.stats_uri),
            format!("Load CharacterInfo from {}", self.info_uri),
            "Drop duplicate stats rows (keep last) and lowercase stats columns".to_string(),
            "Left-join info with stats on 'name'".to_string(),
            format!("Create schema {} if it does not exist", self.target_schema),
            format!(
                "Overwrite managed table {}.{} (overwrite-schema)",
                self.target_schema, self.target_table
            ),
            format!(
                "Overwrite file dataset {} (overwrite-schema)",
                self.file_dataset_path
            ),
        ]
    }
}

/// Result of a completed pipeline run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub lakehouse_root: PathBuf,
    pub schema_status: SchemaStatus,
    pub table_commit: CommitSummary,
    pub file_commit: CommitSummary,
    pub stats: RunStats,
    /// The persisted table
    pub table: RecordBatch,
    pub duration: Duration,
}

/// Run the pipeline with the specified configuration
///
/// Creates the run context, executes every stage in order and closes the
/// context whether or not the run succeeded.
///
/// # Example
///
/// ```no_run
/// use dragonball_bronze::runner::{PipelineConfigBuilder, run_pipeline};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = PipelineConfigBuilder::default()
///     .lakehouse_root("/data/lakehouse")
///     .build()?;
///
/// let report = run_pipeline(config).await?;
/// println!("Wrote {} rows", report.table_commit.rows);
/// # Ok(())
/// # }
/// ```
pub async fn run_pipeline(config: PipelineConfig) -> Result<RunReport> {
    let start_time = Instant::now();
    let lakehouse_root = config.lakehouse_root.clone();

    let ctx = PipelineContext::create(config).await?;
    let run_id = ctx.run_id().to_string();
    let result = Pipeline::new(&ctx).run().await;
    ctx.close();

    let output = result?;
    Ok(RunReport {
        run_id,
        lakehouse_root,
        schema_status: output.schema_status,
        table_commit: output.table_commit,
        file_commit: output.file_commit,
        stats: output.stats,
        table: output.table,
        duration: start_time.elapsed(),
    })
}

/// What `show` reads back
#[derive(Debug, Clone)]
pub enum ShowTarget {
    Table { schema: String, table: String },
    Path(String),
}

impl Default for ShowTarget {
    fn default() -> Self {
        ShowTarget::Table {
            schema: TARGET_SCHEMA.to_string(),
            table: TARGET_TABLE.to_string(),
        }
    }
}

/// Read a managed table or a file dataset back into memory
pub async fn show(lakehouse_root: impl Into<PathBuf>, target: &ShowTarget) -> Result<RecordBatch> {
    let lakehouse = Lakehouse::open(lakehouse_root).await?;
    match target {
        ShowTarget::Table { schema, table } => lakehouse.read_table(schema, table).await,
        ShowTarget::Path(path) => lakehouse.read_path(path).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfigBuilder::default()
            .lakehouse_root("/tmp/lakehouse")
            .build()
            .unwrap();

        assert_eq!(
            config.stats_uri,
            "kaggle://sujithmandala/dragon-ball-z-characters-information/dragon_ball_z.csv"
        );
        assert_eq!(
            config.info_uri,
            "kaggle://shreyasur965/dragon-ball-z-character-database/dragon_ball_z_characters.csv"
        );
        assert_eq!(config.target_schema, "LH_FT_BRONZE_DragonBall");
        assert_eq!(config.target_table, "DragonBall");
        assert_eq!(config.file_dataset_path, "Files/DragonBall/char_info_full");
    }

    #[test]
    fn test_config_requires_lakehouse_root() {
        assert!(PipelineConfigBuilder::default().build().is_err());
    }

    #[test]
    fn test_plan_mentions_targets() {
        let config = PipelineConfigBuilder::default()
            .lakehouse_root("/tmp/lakehouse")
            .build()
            .unwrap();
        let plan = config.plan();

        assert_eq!(plan.len(), 7);
        assert!(plan[5].contains("LH_FT_BRONZE_DragonBall.DragonBall"));
        assert!(plan[6].contains("Files/DragonBall/char_info_full"));
    }
}
