//! The four pipeline stages and their orchestration.

pub mod cleaner;
pub mod context;
pub mod joiner;
pub mod loader;
pub mod persister;

use anyhow::Result;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use std::time::Instant;
use tracing::{debug, info};

pub use context::PipelineContext;

use crate::config::PREVIEW_ROWS;
use crate::io::SourceUri;
use crate::lakehouse::{CommitSummary, SchemaStatus};
use crate::schema::TableSchema;
use crate::telemetry::{RunStats, StageEvent};

/// Render the first rows of a table for logs and the CLI
pub fn preview(batch: &RecordBatch) -> String {
    preview_rows(batch, PREVIEW_ROWS)
}

pub fn preview_rows(batch: &RecordBatch, limit: usize) -> String {
    let head = batch.slice(0, limit.min(batch.num_rows()));
    match pretty_format_batches(&[head]) {
        Ok(table) => table.to_string(),
        Err(e) => format!("<preview unavailable: {}>", e),
    }
}

/// Result of a completed run
#[derive(Debug)]
pub struct PipelineOutput {
    /// The persisted table, as written
    pub table: RecordBatch,
    pub schema_status: SchemaStatus,
    pub table_commit: CommitSummary,
    pub file_commit: CommitSummary,
    pub stats: RunStats,
}

/// Runs the stages in order against one context
pub struct Pipeline<'a> {
    ctx: &'a PipelineContext,
    stats: RunStats,
}

impl<'a> Pipeline<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self {
            ctx,
            stats: RunStats::new(),
        }
    }

    fn record(&mut self, event: StageEvent) {
        info!("{}", event);
        self.stats.update(&event);
    }

    /// Run the complete pipeline
    ///
    /// 1. Load the stats and info datasets
    /// 2. Clean the stats
    /// 3. Left-join info with the cleaned stats
    /// 4. Convert to the storage representation
    /// 5. Ensure the target schema exists
    /// 6. Overwrite the managed table
    /// 7. Overwrite the file dataset
    pub async fn run(mut self) -> Result<PipelineOutput> {
        let ctx = self.ctx;
        info!("Starting run {}", ctx.run_id());

        // 1. Load
        let stats = self
            .load(ctx.stats_source(), TableSchema::character_stats())
            .await?;
        let info = self
            .load(ctx.info_source(), TableSchema::character_info())
            .await?;

        // 2. Clean
        let start = Instant::now();
        let cleaned = cleaner::clean_stats(&stats)?;
        self.record(StageEvent::Cleaned {
            rows_in: stats.num_rows(),
            rows_out: cleaned.num_rows(),
            duration: start.elapsed(),
        });
        debug!("Cleaned stats preview:\n{}", preview(&cleaned));

        // 3. Join
        let start = Instant::now();
        let joined = joiner::join_character_tables(&info, &cleaned)?;
        self.record(StageEvent::Joined {
            rows: joined.batch.num_rows(),
            unmatched: joined.unmatched,
            duration: start.elapsed(),
        });
        debug!("Joined preview:\n{}", preview(&joined.batch));

        // 4. Storage representation
        let table = persister::prepare_for_storage(&joined.batch)?;

        // 5. Schema
        let schema_status = persister::ensure_schema(ctx).await?;

        // 6. Write A
        let config = ctx.config();
        let start = Instant::now();
        let table_commit = persister::write_managed_table(ctx, &table).await?;
        self.record(StageEvent::Persisted {
            target: format!("{}.{}", config.target_schema, config.target_table),
            version: table_commit.version,
            rows: table_commit.rows,
            duration: start.elapsed(),
        });

        // 7. Write B; a failure here leaves write A in place
        let start = Instant::now();
        let file_commit = persister::write_file_dataset(ctx, &table).await?;
        self.record(StageEvent::Persisted {
            target: config.file_dataset_path.clone(),
            version: file_commit.version,
            rows: file_commit.rows,
            duration: start.elapsed(),
        });

        Ok(PipelineOutput {
            table,
            schema_status,
            table_commit,
            file_commit,
            stats: self.stats,
        })
    }

    async fn load(
        &mut self,
        source: &SourceUri,
        schema: TableSchema,
    ) -> Result<RecordBatch> {
        let start = Instant::now();
        let batch = loader::load_table(self.ctx, source, &schema).await?;
        self.record(StageEvent::Loaded {
            table: schema.name,
            rows: batch.num_rows(),
            columns: batch.num_columns(),
            duration: start.elapsed(),
        });
        Ok(batch)
    }
}
