use std::fmt;
use std::time::Duration;

/// Telemetry events emitted by the pipeline as each stage completes
#[derive(Debug, Clone)]
pub enum StageEvent {
    /// A source table was fetched and parsed
    Loaded {
        table: String,
        rows: usize,
        columns: usize,
        duration: Duration,
    },
    /// Duplicate stats rows were dropped
    Cleaned {
        rows_in: usize,
        rows_out: usize,
        duration: Duration,
    },
    /// Info and stats were left-joined
    Joined {
        rows: usize,
        unmatched: usize,
        duration: Duration,
    },
    /// One write target was committed
    Persisted {
        target: String,
        version: u64,
        rows: usize,
        duration: Duration,
    },
}

impl StageEvent {
    pub fn stage(&self) -> &'static str {
        match self {
            StageEvent::Loaded { .. } => "load",
            StageEvent::Cleaned { .. } => "clean",
            StageEvent::Joined { .. } => "join",
            StageEvent::Persisted { .. } => "persist",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            StageEvent::Loaded { duration, .. }
            | StageEvent::Cleaned { duration, .. }
            | StageEvent::Joined { duration, .. }
            | StageEvent::Persisted { duration, .. } => *duration,
        }
    }
}

impl fmt::Display for StageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.duration().as_millis();
        match self {
            StageEvent::Loaded {
                table,
                rows,
                columns,
                ..
            } => write!(f, "loaded {}: {} rows x {} columns ({} ms)", table, rows, columns, ms),
            StageEvent::Cleaned {
                rows_in, rows_out, ..
            } => write!(f, "cleaned stats: {} -> {} rows ({} ms)", rows_in, rows_out, ms),
            StageEvent::Joined {
                rows, unmatched, ..
            } => write!(f, "joined: {} rows, {} without stats ({} ms)", rows, unmatched, ms),
            StageEvent::Persisted {
                target,
                version,
                rows,
                ..
            } => write!(f, "persisted {} v{}: {} rows ({} ms)", target, version, rows, ms),
        }
    }
}

/// Statistics aggregated from stage events
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub tables_loaded: usize,
    pub rows_loaded: usize,
    pub duplicates_removed: usize,
    pub rows_joined: usize,
    pub unmatched_rows: usize,
    /// (target, committed version)
    pub commits: Vec<(String, u64)>,
    /// (stage, duration) in completion order
    pub stage_durations: Vec<(&'static str, Duration)>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a stage event
    pub fn update(&mut self, event: &StageEvent) {
        match event {
            StageEvent::Loaded { rows, .. } => {
                self.tables_loaded += 1;
                self.rows_loaded += rows;
            }
            StageEvent::Cleaned {
                rows_in, rows_out, ..
            } => {
                self.duplicates_removed += rows_in.saturating_sub(*rows_out);
            }
            StageEvent::Joined {
                rows, unmatched, ..
            } => {
                self.rows_joined = *rows;
                self.unmatched_rows = *unmatched;
            }
            StageEvent::Persisted {
                target, version, ..
            } => {
                self.commits.push((target.clone(), *version));
            }
        }
        self.stage_durations.push((event.stage(), event.duration()));
    }

    /// Total time spent in a stage
    pub fn stage_total(&self, stage: &str) -> Duration {
        self.stage_durations
            .iter()
            .filter(|(name, _)| *name == stage)
            .map(|(_, d)| *d)
            .sum()
    }

    /// Total time per stage, in the order stages first completed
    pub fn stage_totals(&self) -> Vec<(&'static str, Duration)> {
        let mut stages: Vec<&'static str> = Vec::new();
        for (stage, _) in &self.stage_durations {
            if !stages.contains(stage) {
                stages.push(*stage);
            }
        }
        stages
            .into_iter()
            .map(|stage| (stage, self.stage_total(stage)))
            .collect()
    }
}
