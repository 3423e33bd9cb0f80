//! Run-wide progress counters and the final import summary

use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{FileJob, FileState};

/// Live counters shared by every worker of a run
#[derive(Debug, Default)]
pub struct ImportMetrics {
    files_started: AtomicU64,
    files_committed: AtomicU64,
    files_failed: AtomicU64,
    rows_accepted: AtomicU64,
    rows_skipped: AtomicU64,
    active_files: AtomicUsize,
    peak_active_files: AtomicUsize,
    open_transactions: AtomicUsize,
    peak_open_transactions: AtomicUsize,
}

impl ImportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a pipeline as running until the returned guard is dropped
    pub fn file_started(&self) -> GaugeGuard<'_> {
        self.files_started.fetch_add(1, Ordering::Relaxed);
        GaugeGuard::enter(&self.active_files, &self.peak_active_files)
    }

    /// Mark a transaction as open until the returned guard is dropped
    pub fn transaction_opened(&self) -> GaugeGuard<'_> {
        GaugeGuard::enter(&self.open_transactions, &self.peak_open_transactions)
    }

    pub fn record_outcome(&self, job: &FileJob) {
        match job.state() {
            FileState::Committed => {
                self.files_committed.fetch_add(1, Ordering::Relaxed);
                self.rows_accepted.fetch_add(job.rows.accepted, Ordering::Relaxed);
            },
            FileState::Failed => {
                self.files_failed.fetch_add(1, Ordering::Relaxed);
            },
            FileState::Pending | FileState::Running => {},
        }
        self.rows_skipped.fetch_add(job.rows.skipped, Ordering::Relaxed);
    }

    pub fn active_files(&self) -> usize {
        self.active_files.load(Ordering::SeqCst)
    }

    pub fn peak_active_files(&self) -> usize {
        self.peak_active_files.load(Ordering::SeqCst)
    }

    pub fn open_transactions(&self) -> usize {
        self.open_transactions.load(Ordering::SeqCst)
    }

    pub fn peak_open_transactions(&self) -> usize {
        self.peak_open_transactions.load(Ordering::SeqCst)
    }

    pub fn files_started(&self) -> u64 {
        self.files_started.load(Ordering::Relaxed)
    }

    pub fn files_committed(&self) -> u64 {
        self.files_committed.load(Ordering::Relaxed)
    }

    pub fn files_failed(&self) -> u64 {
        self.files_failed.load(Ordering::Relaxed)
    }

    pub fn rows_accepted(&self) -> u64 {
        self.rows_accepted.load(Ordering::Relaxed)
    }

    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped.load(Ordering::Relaxed)
    }
}

/// Decrements a gauge on drop, so early returns and panics keep it honest
#[derive(Debug)]
pub struct GaugeGuard<'a> {
    gauge: &'a AtomicUsize,
}

impl<'a> GaugeGuard<'a> {
    fn enter(gauge: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = gauge.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { gauge }
    }
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.gauge.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Outcome of one importer invocation
#[derive(Debug, Clone, Serialize)]
pub struct ImportRun {
    pub run_id: Uuid,
    /// Jobs in discovery order
    pub jobs: Vec<FileJob>,
    pub elapsed: Duration,
    pub deadline_exceeded: bool,
}

/// Aggregated counters of an [`ImportRun`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub files_discovered: usize,
    pub files_attempted: usize,
    pub files_committed: usize,
    pub files_failed: usize,
    pub files_not_started: usize,
    pub rows_read: u64,
    pub rows_accepted: u64,
    pub rows_skipped: u64,
}

impl ImportRun {
    pub fn new(run_id: Uuid, mut jobs: Vec<FileJob>, elapsed: Duration, deadline_exceeded: bool) -> Self {
        jobs.sort_by_key(|job| job.index);
        Self {
            run_id,
            jobs,
            elapsed,
            deadline_exceeded,
        }
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            files_discovered: self.jobs.len(),
            ..RunSummary::default()
        };

        for job in &self.jobs {
            match job.state() {
                FileState::Committed => {
                    summary.files_committed += 1;
                    summary.rows_accepted += job.rows.accepted;
                },
                FileState::Failed => summary.files_failed += 1,
                FileState::Pending => summary.files_not_started += 1,
                FileState::Running => {},
            }
            if job.state() != FileState::Pending {
                summary.files_attempted += 1;
            }
            summary.rows_read += job.rows.read;
            summary.rows_skipped += job.rows.skipped;
        }

        summary
    }

    pub fn has_failures(&self) -> bool {
        self.jobs.iter().any(|job| job.state() == FileState::Failed)
    }

    pub fn job(&self, path: &Path) -> Option<&FileJob> {
        self.jobs.iter().find(|job| job.path == path)
    }

    /// Log one line per failed file and a final structured summary
    pub fn log(&self) {
        for job in self.jobs.iter().filter(|j| j.state() == FileState::Failed) {
            warn!(
                run_id = %self.run_id,
                file = %job.file_name(),
                error = job.error.as_deref().unwrap_or("unknown"),
                "File failed"
            );
        }

        let s = self.summary();
        info!(
            run_id = %self.run_id,
            files_discovered = s.files_discovered,
            files_attempted = s.files_attempted,
            files_committed = s.files_committed,
            files_failed = s.files_failed,
            files_not_started = s.files_not_started,
            rows_read = s.rows_read,
            rows_accepted = s.rows_accepted,
            rows_skipped = s.rows_skipped,
            deadline_exceeded = self.deadline_exceeded,
            elapsed_secs = format!("{:.2}", self.elapsed.as_secs_f64()),
            "Import run finished"
        );
    }

    /// Write the run as pretty JSON
    pub fn write_json(&self, path: &Path) -> tradeflow_common::Result<()> {
        let report = serde_json::json!({
            "run_id": self.run_id,
            "summary": self.summary(),
            "deadline_exceeded": self.deadline_exceeded,
            "elapsed_secs": self.elapsed.as_secs_f64(),
            "files": self.jobs,
        });
        std::fs::write(path, serde_json::to_vec_pretty(&report)?)?;
        Ok(())
    }
}
