//! Importer configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Import Defaults
// ============================================================================

/// Default directory scanned for trade files.
pub const DEFAULT_INPUT_DIR: &str = "./data-csv";

/// Default global deadline for one run (30 minutes).
pub const DEFAULT_DEADLINE_SECS: u64 = 1800;

/// Default number of rows per multi-row INSERT.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default accepted-row interval between progress log lines.
pub const DEFAULT_PROGRESS_EVERY: u64 = 100_000;

/// PostgreSQL caps bind parameters per statement at 65535; 11 per row.
pub const MAX_BATCH_SIZE: usize = 65_535 / 11;

/// Host core count, the default worker concurrency
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Settings for one import run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Directory holding the trade files
    pub input_dir: PathBuf,
    /// Maximum number of files imported concurrently
    pub workers: usize,
    /// Wall-clock budget for the whole run
    pub deadline_secs: u64,
    /// Rows buffered per INSERT statement
    pub batch_size: usize,
    /// Log progress every this many accepted rows
    pub progress_every: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            workers: default_workers(),
            deadline_secs: DEFAULT_DEADLINE_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl ImportConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("workers must be greater than 0");
        }
        if self.deadline_secs == 0 {
            anyhow::bail!("deadline must be greater than 0 seconds");
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            anyhow::bail!(
                "batch_size must be between 1 and {} (got {})",
                MAX_BATCH_SIZE,
                self.batch_size
            );
        }
        if self.progress_every == 0 {
            anyhow::bail!("progress_every must be greater than 0");
        }
        Ok(())
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}
