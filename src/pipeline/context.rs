use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::formats::ReaderFactory;
use crate::io::{RegistryClient, RegistryCredentials, SourceUri};
use crate::lakehouse::Lakehouse;
use crate::runner::PipelineConfig;

/// Per-run state shared by every stage
///
/// Created once before the first stage and closed after the last one.
pub struct PipelineContext {
    run_id: String,
    started_at: DateTime<Utc>,
    config: PipelineConfig,
    stats_source: SourceUri,
    info_source: SourceUri,
    readers: ReaderFactory,
    lakehouse: Lakehouse,
}

impl PipelineContext {
    pub async fn create(config: PipelineConfig) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();

        let stats_source = SourceUri::parse(&config.stats_uri)
            .with_context(|| format!("Invalid stats source '{}'", config.stats_uri))?;
        let info_source = SourceUri::parse(&config.info_uri)
            .with_context(|| format!("Invalid info source '{}'", config.info_uri))?;

        let credentials = RegistryCredentials::discover()?;
        if credentials.is_none() {
            debug!("No registry credentials found, requests are sent anonymously");
        }
        let registry = RegistryClient::new(&config.registry_base_url, credentials)?;

        let readers = ReaderFactory::new(registry);

        let lakehouse = Lakehouse::open(&config.lakehouse_root).await?;

        info!(
            "Run {} started with lakehouse {}",
            run_id,
            lakehouse.root().display()
        );

        Ok(Self {
            run_id,
            started_at: Utc::now(),
            config,
            stats_source,
            info_source,
            readers,
            lakehouse,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats_source(&self) -> &SourceUri {
        &self.stats_source
    }

    pub fn info_source(&self) -> &SourceUri {
        &self.info_source
    }

    pub fn readers(&self) -> &ReaderFactory {
        &self.readers
    }

    pub fn lakehouse(&self) -> &Lakehouse {
        &self.lakehouse
    }

    /// End the run; the context cannot be used afterwards
    pub fn close(self) {
        let elapsed = Utc::now() - self.started_at;
        info!(
            "Run {} closed after {:.2}s",
            self.run_id,
            elapsed.num_milliseconds() as f64 / 1000.0
        );
    }
}
