//! Configuration constants for the bronze pipeline
//!
//! This module centralizes the fixed identifiers of the pipeline (dataset
//! references, lakehouse destinations) and the tunables of the I/O layer.

use std::time::Duration;

// ============================================================================
// Source Datasets
// ============================================================================

/// Registry namespace, dataset slug and file name of the character stats table
pub const STATS_DATASET: (&str, &str, &str) = (
    "sujithmandala",
    "dragon-ball-z-characters-information",
    "dragon_ball_z.csv",
);

/// Registry namespace, dataset slug and file name of the character info table
pub const INFO_DATASET: (&str, &str, &str) = (
    "shreyasur965",
    "dragon-ball-z-character-database",
    "dragon_ball_z_characters.csv",
);

// ============================================================================
// Lakehouse Destinations
// ============================================================================

pub const TARGET_SCHEMA: &str = "LH_FT_BRONZE_DragonBall";

pub const TARGET_TABLE: &str = "DragonBall";

/// Logical path of the file dataset copy, relative to the lakehouse root
pub const FILE_DATASET_PATH: &str = "Files/DragonBall/char_info_full";

// ============================================================================
// Registry Client Configuration
// ============================================================================

pub const REGISTRY_BASE_URL: &str = "https://www.kaggle.com/api/v1";

/// Timeout for a single dataset download
///
/// Character datasets are a few hundred kilobytes; two minutes leaves room
/// for slow links without letting a stalled connection hang the run.
pub const REGISTRY_TIMEOUT: Duration = Duration::from_secs(120);

pub const REGISTRY_USER_AGENT: &str = concat!("dragonball-bronze/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Parsing Configuration
// ============================================================================

/// Tokens read as null when parsing delimited files
pub const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Rows shown by stage previews and the CLI summary
pub const PREVIEW_ROWS: usize = 10;

// ============================================================================
// Storage Configuration
// ============================================================================

/// Maximum rows per Parquet row group for persisted data files
pub const PARQUET_ROW_GROUP_SIZE: usize = 64 * 1024;

pub const DELTA_MIN_READER_VERSION: u32 = 1;

pub const DELTA_MIN_WRITER_VERSION: u32 = 2;
