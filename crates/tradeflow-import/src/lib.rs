//! Tradeflow Import Library
//!
//! Concurrent bulk import of exchange trade files into PostgreSQL.
//!
//! # Pipeline
//!
//! - [`discovery`]: lists the `.csv` files of an input directory
//! - [`transform`]: turns one raw `;`-separated row into a [`TradeRecord`]
//! - [`loader`]: streams one file through a single transaction
//! - [`scheduler`]: runs at most N loaders at once under a global deadline
//! - [`report`]: live gauges and the final run summary
//!
//! # Example
//!
//! ```no_run
//! use tradeflow_import::{config::ImportConfig, db, discovery, loader::PgFileImporter, scheduler::ImportScheduler};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ImportConfig::default();
//!     let files = discovery::discover_files(&config.input_dir).await?;
//!     let pool = db::create_pool(&db::DbConfig::from_env()?).await?;
//!
//!     let scheduler = ImportScheduler::new(PgFileImporter::new(pool, &config), config.workers, config.deadline());
//!     let run = scheduler.run(files).await;
//!     println!("{:?}", run.summary());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod loader;
pub mod models;
pub mod report;
pub mod scheduler;
pub mod transform;

pub use error::{FormatError, ImportError, Result};
pub use models::{FileJob, FileState, TradeRecord};
pub use report::{ImportMetrics, ImportRun, RunSummary};
