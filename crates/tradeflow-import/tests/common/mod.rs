//! Common test utilities for tradeflow-import integration tests
//!
//! Spins up a disposable PostgreSQL container with `sql/schema.sql` applied
//! and writes trade file fixtures into temporary directories.

#![allow(dead_code)]

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};

/// Schema shipped with the repository
pub const SCHEMA_SQL: &str = include_str!("../../../../sql/schema.sql");

/// Header line of the trade files
pub const HEADER: &str = "DataReferencia;CodigoInstrumento;AcaoAtualizacao;PrecoNegocio;QuantidadeNegociada;HoraFechamento;CodigoIdentificadorNegocio;TipoSessaoPregao;DataNegocio;CodigoParticipanteComprador;CodigoParticipanteVendedor";

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
        Self::start_with_pool_size(10).await
    }

    pub async fn start_with_pool_size(max_connections: u32) -> Result<Self> {
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
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("Failed to apply schema")?;

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

    /// Number of persisted trades
    pub async fn trade_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trades")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A valid trade row for `ticker` with the given deal id and no seller code
pub fn trade_row(ticker: &str, deal_id: i64) -> String {
    priced_row(ticker, "1.234,56", deal_id)
}

/// A trade row with a raw price field
pub fn priced_row(ticker: &str, price: &str, deal_id: i64) -> String {
    format!("2024-03-01;{ticker};0;{price};100;093000123;{deal_id};1;2024-03-01;120;")
}

/// Write a trade file with the header followed by `rows`
pub fn write_trade_file(dir: &Path, name: &str, rows: &[String]) -> PathBuf {
    let mut contents = String::from(HEADER);
    contents.push('\n');
    for row in rows {
        contents.push_str(row);
        contents.push('\n');
    }

    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Initialize tracing for tests
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,tradeflow_import=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}
