//! Bounded-concurrency dispatch of file imports
//!
//! Files are handed out in discovery order to at most `workers` concurrent
//! pipelines. Each pipeline runs on its own tokio task so CSV parsing uses all
//! cores; `buffer_unordered` provides the slot limit and the join-all.
//!
//! One [`CancellationToken`] governs the run. It fires when the deadline
//! elapses (or when the caller cancels it, e.g. on Ctrl-C). Files pulled from
//! the queue after that point are never started; running importers see the
//! token at their next database operation and roll back.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::models::FileJob;
use crate::report::{ImportMetrics, ImportRun};

/// What an importer gets besides the job itself
pub struct ImportContext<'a> {
    pub cancel: &'a CancellationToken,
    pub metrics: &'a ImportMetrics,
}

/// Imports a single file
///
/// Implementations update `job.rows` as they go. Returning `Ok` means the
/// file's transaction committed; any error means nothing from the file is
/// visible.
#[async_trait]
pub trait FileImporter: Send + Sync + 'static {
    async fn import(&self, job: &mut FileJob, ctx: &ImportContext<'_>) -> Result<()>;
}

/// Runs one import pipeline per file with a concurrency limit and a deadline
pub struct ImportScheduler<I> {
    importer: Arc<I>,
    workers: usize,
    deadline: Duration,
    metrics: Arc<ImportMetrics>,
}

impl<I: FileImporter> ImportScheduler<I> {
    pub fn new(importer: I, workers: usize, deadline: Duration) -> Self {
        Self {
            importer: Arc::new(importer),
            workers: workers.max(1),
            deadline,
            metrics: Arc::new(ImportMetrics::new()),
        }
    }

    /// Live counters for this scheduler's runs
    pub fn metrics(&self) -> Arc<ImportMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Import `files` and wait for every dispatched file to finish.
    pub async fn run(&self, files: Vec<PathBuf>) -> ImportRun {
        self.run_with_cancel(files, CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but also stops when `cancel` fires.
    pub async fn run_with_cancel(&self, files: Vec<PathBuf>, cancel: CancellationToken) -> ImportRun {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let total = files.len();
        let token = cancel.child_token();
        let deadline_hit = Arc::new(AtomicBool::new(false));

        info!(
            run_id = %run_id,
            files = total,
            workers = self.workers,
            deadline_secs = self.deadline.as_secs(),
            "Starting import run"
        );

        let timer = tokio::spawn({
            let token = token.clone();
            let deadline_hit = Arc::clone(&deadline_hit);
            let metrics = Arc::clone(&self.metrics);
            let deadline = self.deadline;
            async move {
                tokio::time::sleep(deadline).await;
                deadline_hit.store(true, Ordering::SeqCst);
                warn!(
                    run_id = %run_id,
                    files_started = metrics.files_started(),
                    files_committed = metrics.files_committed(),
                    files_failed = metrics.files_failed(),
                    rows_accepted = metrics.rows_accepted(),
                    rows_skipped = metrics.rows_skipped(),
                    active_files = metrics.active_files(),
                    "Import deadline reached, cancelling outstanding files"
                );
                token.cancel();
            }
        });

        let jobs: Vec<FileJob> = stream::iter(files.into_iter().enumerate())
            .map(|(index, path)| {
                let importer = Arc::clone(&self.importer);
                let metrics = Arc::clone(&self.metrics);
                let token = token.clone();

                async move {
                    let job = FileJob::new(index, path);
                    if token.is_cancelled() {
                        debug!(file = %job.file_name(), "Run cancelled; file not started");
                        return job;
                    }

                    let path = job.path.clone();
                    let handle = tokio::spawn(run_job(
                        importer,
                        Arc::clone(&metrics),
                        job,
                        token,
                        run_id,
                        (index, total),
                    ));

                    match handle.await {
                        Ok(job) => job,
                        Err(e) => {
                            error!(file = %path.display(), error = %e, "Import task aborted");
                            let mut job = FileJob::new(index, path);
                            job.start();
                            job.fail(format!("import task aborted: {e}"));
                            metrics.record_outcome(&job);
                            job
                        },
                    }
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        timer.abort();

        let run = ImportRun::new(
            run_id,
            jobs,
            started.elapsed(),
            deadline_hit.load(Ordering::SeqCst),
        );
        run.log();
        run
    }
}

async fn run_job<I: FileImporter>(
    importer: Arc<I>,
    metrics: Arc<ImportMetrics>,
    mut job: FileJob,
    cancel: CancellationToken,
    run_id: Uuid,
    (index, total): (usize, usize),
) -> FileJob {
    let span = info_span!("import_file", run_id = %run_id, file = %job.file_name());

    async move {
        let _active = metrics.file_started();
        job.start();
        info!(position = index + 1, of = total, "Importing file");

        let ctx = ImportContext {
            cancel: &cancel,
            metrics: &metrics,
        };

        match importer.import(&mut job, &ctx).await {
            Ok(()) => {
                job.commit();
                info!(
                    rows_read = job.rows.read,
                    rows_accepted = job.rows.accepted,
                    rows_skipped = job.rows.skipped,
                    "File committed"
                );
            },
            Err(e) if e.is_deadline() => {
                warn!(rows_read = job.rows.read, "File rolled back: deadline exceeded");
                job.fail(e);
            },
            Err(e) => {
                error!(error = %e, rows_read = job.rows.read, "File failed and was rolled back");
                job.fail(e);
            },
        }

        metrics.record_outcome(&job);
        job
    }
    .instrument(span)
    .await
}
