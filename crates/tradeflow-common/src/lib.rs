//! Tradeflow Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging setup for the tradeflow workspace.
//!
//! - **Error Handling**: [`TradeflowError`] and the [`Result`] alias
//! - **Dates**: strict `YYYY-MM-DD` parsing shared by the importer and server
//! - **Logging**: environment-driven `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use tradeflow_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod date;
pub mod error;
pub mod logging;

pub use date::parse_iso_date;
pub use error::{Result, TradeflowError};
