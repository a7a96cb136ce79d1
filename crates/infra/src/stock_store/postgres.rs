//! Postgres-backed stock store implementation.
//!
//! Rows live in the `stock_levels` table (see `migrations/0001_stock_levels.sql`)
//! with a unique constraint on `(variant_id, warehouse_id)`, `quantity >= 0` and
//! `version >= 1` check constraints.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `UniqueViolation` | Concurrent first insert for the same pair |
//! | Database (serialization failure) | `40001` | `SerializationFailure` | Isolation conflict at commit |
//! | Database (deadlock detected) | `40P01` | `SerializationFailure` | Lock cycle broken by the server |
//! | Database (check / foreign key) | `23514` / `23503` | `ConstraintViolation` | Row rejected by a constraint |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolTimedOut / PoolClosed / Io | N/A | `Unavailable` | Connection could not be obtained |
//! | Other | N/A | `Backend` | Protocol, decode and driver errors |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use stockledger_core::{StockLevelId, VariantId, Version, WarehouseId};
use stockledger_inventory::{StockKey, StockLevel};

use super::r#trait::{StockStore, StockTransaction, StoreError};

/// Postgres-backed transactional stock store.
///
/// Locking reads use `SELECT ... FOR UPDATE`; conditional writes add
/// `AND version = $n` to the `UPDATE` predicate and report rows affected.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    /// Create a new PostgresStockStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

/// Open transaction on a [`PostgresStockStore`].
///
/// Dropping it without commit returns the connection to the pool with the
/// transaction rolled back.
pub struct PostgresStockTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StockStore for PostgresStockStore {
    type Tx = PostgresStockTx;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresStockTx { tx })
    }

    #[instrument(
        skip(self),
        fields(variant_id = %key.variant_id, warehouse_id = %key.warehouse_id),
        err
    )]
    async fn get(&self, key: &StockKey) -> Result<Option<StockLevel>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, variant_id, warehouse_id, quantity, version, created_at, updated_at
            FROM stock_levels
            WHERE variant_id = $1 AND warehouse_id = $2
            "#,
        )
        .bind(key.variant_id.as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_stock_level", e))?;

        row.map(|row| decode_row(&row)).transpose()
    }
}

#[async_trait]
impl StockTransaction for PostgresStockTx {
    #[instrument(
        skip(self),
        fields(variant_id = %key.variant_id, warehouse_id = %key.warehouse_id),
        err
    )]
    async fn lock_for_update(&mut self, key: &StockKey) -> Result<Option<StockLevel>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, variant_id, warehouse_id, quantity, version, created_at, updated_at
            FROM stock_levels
            WHERE variant_id = $1 AND warehouse_id = $2
            FOR UPDATE
            "#,
        )
        .bind(key.variant_id.as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_stock_level", e))?;

        row.map(|row| decode_row(&row)).transpose()
    }

    #[instrument(skip(self, level), fields(stock_level_id = %level.id()), err)]
    async fn insert(&mut self, level: &StockLevel) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stock_levels (
                id,
                variant_id,
                warehouse_id,
                quantity,
                version,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(level.id().as_uuid())
        .bind(level.variant_id().as_uuid())
        .bind(level.warehouse_id().as_uuid())
        .bind(level.quantity())
        .bind(version_to_i64(level.version())?)
        .bind(level.created_at())
        .bind(level.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_stock_level", e))?;

        Ok(())
    }

    #[instrument(
        skip(self, level),
        fields(stock_level_id = %level.id(), expected_version = %expected),
        err
    )]
    async fn update_if_version(
        &mut self,
        level: &StockLevel,
        expected: Version,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE stock_levels
            SET quantity = $1, version = $2, updated_at = $3
            WHERE variant_id = $4 AND warehouse_id = $5 AND version = $6
            "#,
        )
        .bind(level.quantity())
        .bind(version_to_i64(level.version())?)
        .bind(level.updated_at())
        .bind(level.variant_id().as_uuid())
        .bind(level.warehouse_id().as_uuid())
        .bind(version_to_i64(expected)?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_stock_level", e))?;

        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback_transaction", e))
    }
}

fn version_to_i64(version: Version) -> Result<i64, StoreError> {
    i64::try_from(version.get())
        .map_err(|_| StoreError::Corrupt(format!("version {version} exceeds BIGINT range")))
}

fn decode_row(row: &sqlx::postgres::PgRow) -> Result<StockLevel, StoreError> {
    let decoded = StockLevelRow::from_row(row)
        .map_err(|e| StoreError::Corrupt(format!("failed to decode stock level row: {e}")))?;
    decoded.try_into()
}

// SQLx row types

#[derive(Debug)]
struct StockLevelRow {
    id: uuid::Uuid,
    variant_id: uuid::Uuid,
    warehouse_id: uuid::Uuid,
    quantity: i64,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StockLevelRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockLevelRow {
            id: row.try_get("id")?,
            variant_id: row.try_get("variant_id")?,
            warehouse_id: row.try_get("warehouse_id")?,
            quantity: row.try_get("quantity")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<StockLevelRow> for StockLevel {
    type Error = StoreError;

    fn try_from(row: StockLevelRow) -> Result<Self, Self::Error> {
        let version = u64::try_from(row.version)
            .map_err(|_| StoreError::Corrupt(format!("negative version {}", row.version)))?;
        StockLevel::from_parts(
            StockLevelId::from_uuid(row.id),
            VariantId::from_uuid(row.variant_id),
            WarehouseId::from_uuid(row.warehouse_id),
            row.quantity,
            version,
            row.created_at,
            row.updated_at,
        )
        .map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(msg),
                Some("40001") | Some("40P01") => StoreError::SerializationFailure(msg),
                Some("23514") | Some("23503") => StoreError::ConstraintViolation(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {}: {}", operation, e)),
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
