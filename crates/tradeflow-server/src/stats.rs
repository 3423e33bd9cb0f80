//! Aggregate lookups over the `trades` table

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, PgPool, Postgres};

const MAX_PRICE: Lookup = Lookup {
    name: "max_price",
    unbounded: "SELECT MAX(trade_price)::DOUBLE PRECISION FROM trades WHERE instrument_code = $1",
    bounded: "SELECT MAX(trade_price)::DOUBLE PRECISION FROM trades \
              WHERE instrument_code = $1 AND trade_date >= $2",
};

const MAX_DAILY_VOLUME: Lookup = Lookup {
    name: "max_daily_volume",
    unbounded: "SELECT MAX(daily_volume)::BIGINT FROM ( \
                    SELECT SUM(traded_quantity) AS daily_volume FROM trades \
                    WHERE instrument_code = $1 GROUP BY trade_date \
                ) AS days",
    bounded: "SELECT MAX(daily_volume)::BIGINT FROM ( \
                  SELECT SUM(traded_quantity) AS daily_volume FROM trades \
                  WHERE instrument_code = $1 AND trade_date >= $2 GROUP BY trade_date \
              ) AS days",
};

/// One aggregate, with and without the trade date floor
struct Lookup {
    name: &'static str,
    unbounded: &'static str,
    bounded: &'static str,
}

impl Lookup {
    fn sql(&self, from: Option<NaiveDate>) -> &'static str {
        if from.is_some() {
            self.bounded
        } else {
            self.unbounded
        }
    }
}

/// Maxima for one instrument
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub max_price: f64,
    pub max_daily_volume: i64,
}

/// Read-side queries, prepared and checked once at construction
#[derive(Debug, Clone)]
pub struct TradeStatsRepository {
    pool: PgPool,
}

impl TradeStatsRepository {
    /// Validate every statement against the live schema.
    ///
    /// Fails when the `trades` table or one of its columns is missing, so a
    /// misconfigured server refuses to start instead of failing per request.
    pub async fn new(pool: PgPool) -> Result<Self, sqlx::Error> {
        for lookup in [&MAX_PRICE, &MAX_DAILY_VOLUME] {
            for sql in [lookup.unbounded, lookup.bounded] {
                (&pool).prepare(sql).await?;
            }
            tracing::debug!(lookup = lookup.name, "Prepared stats statements");
        }
        Ok(Self { pool })
    }

    /// Maximum trade price and maximum daily traded volume of `ticker`,
    /// counting only trade dates on or after `from` when given.
    ///
    /// `None` when the instrument has no trades in range.
    pub async fn stats(
        &self,
        ticker: &str,
        from: Option<NaiveDate>,
    ) -> Result<Option<TradeStats>, sqlx::Error> {
        let (max_price, max_daily_volume) = tokio::try_join!(
            self.scalar::<f64>(&MAX_PRICE, ticker, from),
            self.scalar::<i64>(&MAX_DAILY_VOLUME, ticker, from),
        )?;

        Ok(max_price.map(|max_price| TradeStats {
            max_price,
            max_daily_volume: max_daily_volume.unwrap_or(0),
        }))
    }

    async fn scalar<T>(
        &self,
        lookup: &Lookup,
        ticker: &str,
        from: Option<NaiveDate>,
    ) -> Result<Option<T>, sqlx::Error>
    where
        T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres> + Send + Unpin,
    {
        let mut query = sqlx::query_scalar::<_, Option<T>>(lookup.sql(from)).bind(ticker);
        if let Some(from) = from {
            query = query.bind(from);
        }
        query.fetch_one(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_picks_statement_by_bound() {
        let from = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert!(MAX_PRICE.sql(from).contains("trade_date >= $2"));
        assert!(!MAX_PRICE.sql(None).contains("$2"));
        assert!(MAX_DAILY_VOLUME.sql(from).contains("trade_date >= $2"));
        assert!(MAX_DAILY_VOLUME.sql(None).contains("GROUP BY trade_date"));
    }

    #[test]
    fn test_stats_serialize_field_names() {
        let stats = TradeStats {
            max_price: 12.5,
            max_daily_volume: 300,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json, serde_json::json!({"max_price": 12.5, "max_daily_volume": 300}));
    }
}
