//! Domain types for the import pipeline

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use std::path::{Path, PathBuf};

/// One trade as persisted in the `trades` table
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub reference_date: NaiveDate,
    pub instrument_code: String,
    pub update_action: i16,
    pub trade_price: BigDecimal,
    pub traded_quantity: i64,
    pub closing_time: NaiveTime,
    pub deal_id: i64,
    pub session_type: i16,
    pub trade_date: NaiveDate,
    /// Absent when the source column is empty
    pub buyer_code: Option<i64>,
    pub seller_code: Option<i64>,
}

/// Processing state of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Pending,
    Running,
    Committed,
    Failed,
}

impl FileState {
    pub fn as_str(&self) -> &str {
        match self {
            FileState::Pending => "pending",
            FileState::Running => "running",
            FileState::Committed => "committed",
            FileState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FileState::Committed | FileState::Failed)
    }
}

/// Per-file row counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCounters {
    pub read: u64,
    pub accepted: u64,
    pub skipped: u64,
}

/// One discovered input file and its outcome
///
/// Owned by exactly one worker while it runs.
#[derive(Debug, Clone, Serialize)]
pub struct FileJob {
    /// Position in discovery order
    pub index: usize,
    pub path: PathBuf,
    state: FileState,
    pub rows: RowCounters,
    pub error: Option<String>,
}

impl FileJob {
    pub fn new(index: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            path: path.into(),
            state: FileState::Pending,
            rows: RowCounters::default(),
            error: None,
        }
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    /// Short name used in log lines
    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }

    pub fn start(&mut self) {
        debug_assert_eq!(self.state, FileState::Pending, "job started twice");
        self.state = FileState::Running;
    }

    /// Transaction committed; skipped rows do not change the outcome
    pub fn commit(&mut self) {
        debug_assert!(!self.state.is_terminal(), "terminal state set twice");
        self.state = FileState::Committed;
    }

    /// Transaction aborted; nothing from this file is visible, so the accepted
    /// counter is discarded
    pub fn fail(&mut self, error: impl ToString) {
        debug_assert!(!self.state.is_terminal(), "terminal state set twice");
        self.state = FileState::Failed;
        self.rows.accepted = 0;
        self.error = Some(error.to_string());
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
