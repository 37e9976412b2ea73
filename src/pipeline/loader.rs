use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use tracing::{debug, info};

use super::{PipelineContext, preview};
use crate::io::SourceUri;
use crate::schema::TableSchema;

/// Fetch one dataset and validate it against its declared schema
pub async fn load_table(
    ctx: &PipelineContext,
    source: &SourceUri,
    schema: &TableSchema,
) -> Result<RecordBatch> {
    let reader = ctx.readers().create_reader(source)?;
    info!("Loading {} from {}", schema.name, reader.describe());

    let batch = reader
        .read_table(schema)
        .await
        .with_context(|| format!("Failed to load {}", schema.name))?;
    schema.validate(&batch)?;

    debug!("{} preview:\n{}", schema.name, preview(&batch));
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::runner::PipelineConfigBuilder;
    use std::io::Write;
    use tempfile::TempDir;

    async fn context(dir: &TempDir, stats: &str, info: &str) -> PipelineContext {
        let config = PipelineConfigBuilder::default()
            .lakehouse_root(dir.path().join("lakehouse"))
            .stats_uri(stats)
            .info_uri(info)
            .build()
            .unwrap();
        PipelineContext::create(config).await.unwrap()
    }

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> String {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_load_stats_table() {
        let dir = TempDir::new().unwrap();
        let stats = write_file(
            &dir,
            "stats.csv",
            "Name,Ki Blast,Melee Combat,Speed,Special Attack,Transformation\n\
             Goku,95,94,90,Kamehameha,Super Saiyan\n",
        );
        let ctx = context(&dir, &stats, &stats).await;

        let batch = load_table(&ctx, ctx.stats_source(), &TableSchema::character_stats())
            .await
            .unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.num_columns(), 6);
    }

    #[tokio::test]
    async fn test_load_rejects_missing_declared_column() {
        let dir = TempDir::new().unwrap();
        let info = write_file(&dir, "info.csv", "name,race\nGoku,Saiyan\n");
        let ctx = context(&dir, &info, &info).await;

        let err = load_table(&ctx, ctx.info_source(), &TableSchema::character_info())
            .await
            .unwrap_err();
        let pipeline_err = err.downcast_ref::<PipelineError>().unwrap();
        assert!(matches!(pipeline_err, PipelineError::SchemaValidation { .. }));
        assert!(err.to_string().contains("missing column 'ki'"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.csv").to_str().unwrap().to_string();
        let ctx = context(&dir, &missing, &missing).await;

        assert!(
            load_table(&ctx, ctx.stats_source(), &TableSchema::character_stats())
                .await
                .is_err()
        );
    }
}
