//! Common test utilities for tradeflow-server integration tests
//!
//! Spins up a disposable PostgreSQL container with `sql/schema.sql` applied
//! and seeds trades directly with SQL.

#![allow(dead_code)]

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};

/// Schema shipped with the repository
pub const SCHEMA_SQL: &str = include_str!("../../../../sql/schema.sql");

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with the trades schema applied
pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    pool: PgPool,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        Self::start_with_options(true).await
    }

    /// Start without applying the schema
    pub async fn start_empty() -> Result<Self> {
        Self::start_with_options(false).await
    }

    async fn start_with_options(apply_schema: bool) -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        debug!("PostgreSQL connection: {}", connection_string);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        if apply_schema {
            sqlx::raw_sql(SCHEMA_SQL)
                .execute(&pool)
                .await
                .context("Failed to apply schema")?;
        }

        Ok(Self {
            container,
            pool,
            connection_string,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Insert one trade with the columns the stats lookups read
pub async fn insert_trade(
    pool: &PgPool,
    ticker: &str,
    trade_date: &str,
    price: &str,
    quantity: i64,
    deal_id: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO trades (reference_date, instrument_code, update_action, trade_price, \
         traded_quantity, closing_time, deal_id, session_type, trade_date, buyer_code, seller_code) \
         VALUES ($1::DATE, $2, 0, $3::NUMERIC, $4, '10:00:00', $5, 1, $1::DATE, NULL, NULL)",
    )
    .bind(trade_date)
    .bind(ticker)
    .bind(price)
    .bind(quantity)
    .bind(deal_id)
    .execute(pool)
    .await
    .context("Failed to insert trade")?;
    Ok(())
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Initialize tracing for tests
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,tradeflow_server=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}
