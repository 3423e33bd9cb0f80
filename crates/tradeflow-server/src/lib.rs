//! Tradeflow Server Library
//!
//! Read-side HTTP service answering aggregate questions about imported trades.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod serve;
pub mod stats;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::{create_router, AppState};
pub use serve::serve;
pub use stats::{TradeStats, TradeStatsRepository};
