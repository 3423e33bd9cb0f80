//! Tradeflow Import - bulk trade file importer

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tradeflow_common::logging::{init_logging, LogConfig, LogLevel};
use tradeflow_import::{
    config::{self, ImportConfig},
    db::{self, DbConfig},
    discovery,
    loader::PgFileImporter,
    scheduler::ImportScheduler,
};

/// Exit status when the run finished but at least one file failed
const EXIT_FILES_FAILED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "tradeflow-import")]
#[command(author, version, about = "Bulk import of exchange trade files into PostgreSQL")]
struct Cli {
    /// Directory holding the `;`-separated trade files
    #[arg(short, long, env = "TRADEFLOW_INPUT_DIR", default_value = config::DEFAULT_INPUT_DIR)]
    dir: PathBuf,

    /// Maximum number of files imported at once [default: number of cores]
    #[arg(short, long, env = "TRADEFLOW_WORKERS")]
    workers: Option<usize>,

    /// Global deadline for the whole run, in seconds
    #[arg(long, env = "TRADEFLOW_DEADLINE_SECS", default_value_t = config::DEFAULT_DEADLINE_SECS)]
    deadline_secs: u64,

    /// Rows per INSERT statement
    #[arg(long, env = "TRADEFLOW_BATCH_SIZE", default_value_t = config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Log progress every this many accepted rows per file
    #[arg(long, env = "TRADEFLOW_PROGRESS_EVERY", default_value_t = config::DEFAULT_PROGRESS_EVERY)]
    progress_every: u64,

    /// Write the run summary as JSON to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn import_config(&self) -> ImportConfig {
        ImportConfig {
            input_dir: self.dir.clone(),
            workers: self.workers.unwrap_or_else(config::default_workers),
            deadline_secs: self.deadline_secs,
            batch_size: self.batch_size,
            progress_every: self.progress_every,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("tradeflow-import")
        .filter_directives("sqlx=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    let import_config = cli.import_config();
    import_config.validate()?;

    let files = discovery::discover_files(&import_config.input_dir)
        .await
        .with_context(|| format!("Cannot list input directory {}", import_config.input_dir.display()))?;

    let mut db_config = DbConfig::from_env()?;
    db_config.fit_to_workers(import_config.workers);
    let pool = db::create_pool(&db_config)
        .await
        .context("Cannot connect to the database")?;
    db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    if files.is_empty() {
        warn!(dir = %import_config.input_dir.display(), "No trade files found, nothing to import");
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling import");
                cancel.cancel();
            }
        }
    });

    let scheduler = ImportScheduler::new(
        PgFileImporter::new(pool.clone(), &import_config),
        import_config.workers,
        import_config.deadline(),
    );
    let run = scheduler.run_with_cancel(files, cancel).await;
    pool.close().await;

    if let Some(path) = &cli.summary_json {
        match run.write_json(path) {
            Ok(()) => info!(path = %path.display(), "Wrote run summary"),
            Err(e) => error!(path = %path.display(), error = %e, "Failed to write run summary"),
        }
    }

    if run.has_failures() {
        return Ok(ExitCode::from(EXIT_FILES_FAILED));
    }
    Ok(ExitCode::SUCCESS)
}
