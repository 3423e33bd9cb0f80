//! Transactional bulk loading of one trade file
//!
//! Each file gets exactly one transaction. Accepted records are buffered and
//! written as multi-row `INSERT` statements, each inside its own savepoint.
//! When PostgreSQL rejects a batch the savepoint is rolled back and the batch
//! is replayed one row per savepoint, so only the offending rows are skipped
//! and the transaction stays usable.
//!
//! Every database round trip except `COMMIT` races the run's cancellation
//! token. Dropping the transaction on the error path rolls it back.

use async_trait::async_trait;
use csv_async::{AsyncReaderBuilder, StringRecord};
use sqlx::{Acquire, PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ImportConfig;
use crate::error::{ImportError, Result, TradeField, TxStage};
use crate::models::{FileJob, TradeRecord};
use crate::scheduler::{FileImporter, ImportContext};
use crate::transform::transform_row;

/// Field separator of the trade files
pub const FIELD_DELIMITER: u8 = b';';

/// Where a file's load currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    TransactionOpen,
    Streaming,
    Finalizing,
    Committed,
    Failed,
}

impl LoaderState {
    pub fn as_str(&self) -> &str {
        match self {
            LoaderState::Idle => "idle",
            LoaderState::TransactionOpen => "transaction_open",
            LoaderState::Streaming => "streaming",
            LoaderState::Finalizing => "finalizing",
            LoaderState::Committed => "committed",
            LoaderState::Failed => "failed",
        }
    }

    /// Legal forward moves; any non-terminal state may fail
    pub fn can_advance_to(&self, next: LoaderState) -> bool {
        use LoaderState::*;
        matches!(
            (self, next),
            (Idle, TransactionOpen)
                | (TransactionOpen, Streaming)
                | (Streaming, Finalizing)
                | (Finalizing, Committed)
                | (Idle | TransactionOpen | Streaming | Finalizing, Failed)
        )
    }
}

/// Imports trade files into the `trades` table
#[derive(Clone)]
pub struct PgFileImporter {
    pool: PgPool,
    batch_size: usize,
    progress_every: u64,
}

impl PgFileImporter {
    pub fn new(pool: PgPool, config: &ImportConfig) -> Self {
        Self {
            pool,
            batch_size: config.batch_size.max(1),
            progress_every: config.progress_every.max(1),
        }
    }
}

#[async_trait]
impl FileImporter for PgFileImporter {
    async fn import(&self, job: &mut FileJob, ctx: &ImportContext<'_>) -> Result<()> {
        let mut load = FileLoad {
            importer: self,
            ctx,
            state: LoaderState::Idle,
            batch: Vec::with_capacity(self.batch_size),
        };

        let result = load.run(job).await;
        if result.is_err() {
            load.advance(LoaderState::Failed);
        }
        result
    }
}

/// Working state of one file's load
struct FileLoad<'a> {
    importer: &'a PgFileImporter,
    ctx: &'a ImportContext<'a>,
    state: LoaderState,
    batch: Vec<TradeRecord>,
}

impl FileLoad<'_> {
    fn advance(&mut self, next: LoaderState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal loader transition {} -> {}",
            self.state.as_str(),
            next.as_str()
        );
        debug!(from = self.state.as_str(), to = next.as_str(), "Loader state change");
        self.state = next;
    }

    async fn run(&mut self, job: &mut FileJob) -> Result<()> {
        let file = tokio::fs::File::open(&job.path)
            .await
            .map_err(|e| ImportError::io(&job.path, e))?;

        let mut reader = AsyncReaderBuilder::new()
            .delimiter(FIELD_DELIMITER)
            .has_headers(true)
            .flexible(true)
            .create_reader(file);

        let header_columns = reader
            .headers()
            .await
            .map_err(|source| ImportError::Csv {
                path: job.path.clone(),
                source,
            })?
            .len();
        debug!(header_columns, "Read header");

        let cancel = self.ctx.cancel;
        let mut tx = guarded(cancel, TxStage::Begin, self.importer.pool.begin()).await?;
        let _open_tx = self.ctx.metrics.transaction_opened();
        self.advance(LoaderState::TransactionOpen);

        self.advance(LoaderState::Streaming);
        let mut record = StringRecord::new();
        loop {
            match reader.read_record(&mut record).await {
                Ok(false) => break,
                Ok(true) => {
                    job.rows.read += 1;
                    if cancel.is_cancelled() {
                        return Err(ImportError::DeadlineExceeded);
                    }
                    self.accept(&mut tx, job, &record).await?;
                },
                Err(e) if matches!(e.kind(), csv_async::ErrorKind::Io(_)) => {
                    return Err(ImportError::Csv {
                        path: job.path.clone(),
                        source: e,
                    });
                },
                Err(e) => {
                    job.rows.read += 1;
                    job.rows.skipped += 1;
                    warn!(
                        line = e.position().map(|p| p.line()),
                        error = %e,
                        "Skipping unreadable row"
                    );
                },
            }
        }

        self.advance(LoaderState::Finalizing);
        self.flush(&mut tx, job, TxStage::Flush).await?;

        // COMMIT is not raced: a reported failure must mean rolled back
        if cancel.is_cancelled() {
            return Err(ImportError::DeadlineExceeded);
        }
        tx.commit().await.map_err(ImportError::tx(TxStage::Commit))?;
        self.advance(LoaderState::Committed);

        Ok(())
    }

    async fn accept(
        &mut self,
        tx: &mut Transaction<'static, Postgres>,
        job: &mut FileJob,
        record: &StringRecord,
    ) -> Result<()> {
        let fields: Vec<&str> = record.iter().collect();
        match transform_row(&fields) {
            Ok(trade) => {
                self.batch.push(trade);
                if self.batch.len() >= self.importer.batch_size {
                    self.flush(tx, job, TxStage::Insert).await?;
                }
            },
            Err(e) => {
                job.rows.skipped += 1;
                warn!(
                    line = record.position().map(|p| p.line()),
                    error = %e,
                    "Skipping malformed row"
                );
            },
        }
        Ok(())
    }

    /// Write the buffered batch, falling back to row-by-row on rejection
    async fn flush(
        &mut self,
        tx: &mut Transaction<'static, Postgres>,
        job: &mut FileJob,
        stage: TxStage,
    ) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let cancel = self.ctx.cancel;
        let before = job.rows.accepted;

        let mut savepoint = guarded(cancel, stage, Acquire::begin(&mut *tx)).await?;
        match guarded(cancel, stage, insert_trades(&mut savepoint, &self.batch)).await {
            Ok(_) => {
                guarded(cancel, stage, savepoint.commit()).await?;
                job.rows.accepted += self.batch.len() as u64;
            },
            Err(ImportError::Transaction { source, .. }) if is_row_rejection(&source) => {
                guarded(cancel, stage, savepoint.rollback()).await?;
                warn!(
                    rows = self.batch.len(),
                    error = %source,
                    "Batch rejected, retrying row by row"
                );
                self.replay_rows(tx, job, stage).await?;
            },
            Err(e) => return Err(e),
        }

        self.batch.clear();

        let every = self.importer.progress_every;
        if job.rows.accepted / every > before / every {
            info!(
                rows_read = job.rows.read,
                rows_accepted = job.rows.accepted,
                rows_skipped = job.rows.skipped,
                "Import progress"
            );
        }
        Ok(())
    }

    async fn replay_rows(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job: &mut FileJob,
        stage: TxStage,
    ) -> Result<()> {
        let cancel = self.ctx.cancel;

        for trade in &self.batch {
            let mut savepoint = guarded(cancel, stage, Acquire::begin(&mut *tx)).await?;
            match guarded(cancel, stage, insert_trades(&mut savepoint, std::slice::from_ref(trade))).await {
                Ok(_) => {
                    guarded(cancel, stage, savepoint.commit()).await?;
                    job.rows.accepted += 1;
                },
                Err(ImportError::Transaction { source, .. }) if is_row_rejection(&source) => {
                    guarded(cancel, stage, savepoint.rollback()).await?;
                    job.rows.skipped += 1;
                    warn!(
                        deal_id = trade.deal_id,
                        instrument = %trade.instrument_code,
                        error = %source,
                        "Row rejected by database, skipping"
                    );
                },
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Run a database operation unless the run is cancelled first
async fn guarded<T, F>(cancel: &CancellationToken, stage: TxStage, op: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ImportError::DeadlineExceeded),
        res = op => res.map_err(ImportError::tx(stage)),
    }
}

/// A constraint or data error raised by the server, as opposed to a broken
/// connection; only these are skippable per row
fn is_row_rejection(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(_))
}

fn insert_statement() -> String {
    let columns = TradeField::ALL.map(|field| field.column()).join(", ");
    format!("INSERT INTO trades ({columns}) ")
}

/// Insert records as one multi-row statement in the fixed column order
async fn insert_trades(conn: &mut PgConnection, trades: &[TradeRecord]) -> std::result::Result<u64, sqlx::Error> {
    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(insert_statement());

    query_builder.push_values(trades, |mut b, trade| {
        b.push_bind(trade.reference_date)
            .push_bind(&trade.instrument_code)
            .push_bind(trade.update_action)
            .push_bind(&trade.trade_price)
            .push_bind(trade.traded_quantity)
            .push_bind(trade.closing_time)
            .push_bind(trade.deal_id)
            .push_bind(trade.session_type)
            .push_bind(trade.trade_date)
            .push_bind(trade.buyer_code)
            .push_bind(trade.seller_code);
    });

    let result = query_builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_lists_columns_in_file_order() {
        assert_eq!(
            insert_statement(),
            "INSERT INTO trades (reference_date, instrument_code, update_action, trade_price, \
             traded_quantity, closing_time, deal_id, session_type, trade_date, buyer_code, \
             seller_code) "
        );
    }

    #[test]
    fn test_loader_transitions() {
        use LoaderState::*;
        let happy = [Idle, TransactionOpen, Streaming, Finalizing, Committed];
        for pair in happy.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }

        assert!(Streaming.can_advance_to(Failed));
        assert!(Idle.can_advance_to(Failed));
        assert!(!Committed.can_advance_to(Failed));
        assert!(!Idle.can_advance_to(Streaming));
        assert!(!Failed.can_advance_to(Committed));
    }

    #[tokio::test]
    async fn test_guarded_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<()> = guarded(&cancel, TxStage::Insert, async { Ok(()) }).await;
        assert!(matches!(result, Err(ImportError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_guarded_maps_stage() {
        let cancel = CancellationToken::new();

        let result: Result<()> =
            guarded(&cancel, TxStage::Begin, async { Err(sqlx::Error::PoolTimedOut) }).await;
        assert!(matches!(
            result,
            Err(ImportError::Transaction {
                stage: TxStage::Begin,
                ..
            })
        ));
    }

    #[test]
    fn test_only_server_errors_are_row_rejections() {
        assert!(!is_row_rejection(&sqlx::Error::PoolTimedOut));
        assert!(!is_row_rejection(&sqlx::Error::RowNotFound));
    }
}
