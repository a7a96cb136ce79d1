//! Postgres pool wiring and schema bootstrap.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::instrument;

use crate::config::DatabaseConfig;

/// DDL for the `stock_levels` table. Idempotent.
pub const SCHEMA: &str = include_str!("../migrations/0001_stock_levels.sql");

/// Open a connection pool sized and timed by `config`.
#[instrument(skip(config), fields(max_connections = config.max_connections), err)]
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections.min(config.max_connections))
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .acquire_timeout(config.timeout)
        .connect(&config.url)
        .await
}

/// Create the `stock_levels` table and its indexes if they do not exist.
#[instrument(skip(pool), err)]
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    tracing::info!("stock_levels schema ready");
    Ok(())
}
