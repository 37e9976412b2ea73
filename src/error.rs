//! Fatal error kinds raised by the pipeline stages.
//!
//! Stages return `anyhow::Result`; these variants are raised at the failure
//! site so callers can `downcast_ref::<PipelineError>()` through any context
//! added on the way up.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Dataset or file not found, network or authentication failure
    #[error("failed to fetch '{file}' from dataset '{dataset}'")]
    RegistryFetch {
        dataset: String,
        file: String,
        #[source]
        source: BoxError,
    },

    /// Loaded or joined data does not match its declared schema
    #[error("table '{table}' does not match its declared schema: {reason}")]
    SchemaValidation { table: String, reason: String },

    /// A persistence write failed; earlier writes of the same run are kept
    #[error("failed to write {target}")]
    WriteFailure {
        target: String,
        #[source]
        source: BoxError,
    },
}

impl PipelineError {
    pub fn registry_fetch(
        dataset: impl Into<String>,
        file: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::RegistryFetch {
            dataset: dataset.into(),
            file: file.into(),
            source: source.into(),
        }
    }

    pub fn schema_validation(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaValidation {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn write_failure(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::WriteFailure {
            target: target.into(),
            source: source.into(),
        }
    }
}
