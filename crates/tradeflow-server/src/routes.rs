//! HTTP routes
//!
//! - `GET /api/health`
//! - `GET /api/trades/stats?ticker=ABC&from=2024-03-01`

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use tradeflow_common::parse_iso_date;

use crate::config::CorsConfig;
use crate::error::{AppError, AppResult};
use crate::middleware;
use crate::stats::{TradeStats, TradeStatsRepository};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub stats: Arc<TradeStatsRepository>,
}

/// Query string of the stats endpoint
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub ticker: Option<String>,
    pub from: Option<String>,
}

impl StatsQuery {
    /// Required ticker and optional inclusive lower date bound
    pub fn validate(self) -> AppResult<(String, Option<NaiveDate>)> {
        let ticker = self
            .ticker
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::BadRequest("ticker is required".to_string()))?;

        let from = match self.from.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_iso_date(raw)?),
        };

        Ok((ticker, from))
    }
}

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/trades/stats", get(trade_stats));

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> AppResult<Json<Value>> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(|e| {
            tracing::error!("Database health check failed: {:?}", e);
            AppError::Unavailable("database unreachable".to_string())
        })?;

    Ok(Json(json!({ "status": "up" })))
}

/// Maximum price and daily volume of one instrument
///
/// GET /api/trades/stats?ticker=ABC&from=2024-03-01
async fn trade_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<TradeStats>> {
    let (ticker, from) = query.validate()?;

    match state.stats.stats(&ticker, from).await? {
        Some(stats) => Ok(Json(stats)),
        None => Err(AppError::NotFound(format!("no trades for {ticker}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeflow_common::TradeflowError;

    fn query(ticker: Option<&str>, from: Option<&str>) -> StatsQuery {
        StatsQuery {
            ticker: ticker.map(str::to_string),
            from: from.map(str::to_string),
        }
    }

    #[test]
    fn test_validate_accepts_ticker_and_date() {
        let (ticker, from) = query(Some("ABC"), Some("2024-03-01")).validate().unwrap();
        assert_eq!(ticker, "ABC");
        assert_eq!(from, NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[test]
    fn test_validate_empty_from_means_unbounded() {
        let (_, from) = query(Some("ABC"), Some("")).validate().unwrap();
        assert_eq!(from, None);
    }

    #[test]
    fn test_validate_requires_ticker() {
        let err = query(None, None).validate().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = query(Some("  "), None).validate().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_validate_rejects_malformed_date() {
        let err = query(Some("ABC"), Some("01/03/2024")).validate().unwrap_err();
        assert!(matches!(err, AppError::Tradeflow(TradeflowError::InvalidDate(_))));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_validate_rejects_unpadded_date() {
        for raw in ["2024-3-2", "2024-03- 2"] {
            let err = query(Some("ABC"), Some(raw)).validate().unwrap_err();
            assert!(
                matches!(err, AppError::Tradeflow(TradeflowError::InvalidDate(_))),
                "accepted {:?}",
                raw
            );
        }
    }
}
