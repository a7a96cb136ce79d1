use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use stockledger_core::Version;
use stockledger_inventory::{StockKey, StockLevel};

/// Stock store operation error.
///
/// These are **infrastructure errors** (storage, constraints, isolation) as
/// opposed to domain errors (validation, invariants). The engine decides which
/// of them are concurrency conflicts and which are internal failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another transaction already holds a row for the key.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The backend aborted the transaction to preserve isolation
    /// (serialization failure or deadlock).
    #[error("transaction serialization failure: {0}")]
    SerializationFailure(String),

    /// A check or foreign key constraint rejected the write.
    #[error("constraint violated: {0}")]
    ConstraintViolation(String),

    /// The backend could not be reached (pool closed or exhausted, IO failure).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The caller's deadline elapsed before the operation finished.
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(std::time::Duration),

    /// A stored row does not satisfy the record invariants.
    #[error("corrupt stock level row: {0}")]
    Corrupt(String),

    /// Any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Transactional row store holding stock levels.
///
/// One row per [`StockKey`], with a uniqueness constraint on the key. Reads
/// outside a transaction are unlocked and may be stale relative to in-flight
/// adjustments.
#[async_trait]
pub trait StockStore: Send + Sync {
    type Tx: StockTransaction;

    /// Open a transaction.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Plain read of the committed row for `key`.
    async fn get(&self, key: &StockKey) -> Result<Option<StockLevel>, StoreError>;
}

/// A single open transaction on a [`StockStore`].
///
/// Dropping a transaction without committing rolls it back: staged writes are
/// discarded and row locks are released.
#[async_trait]
pub trait StockTransaction: Send {
    /// Read the row for `key`, taking an exclusive row lock held until the
    /// transaction ends. A missing row takes no lock.
    async fn lock_for_update(&mut self, key: &StockKey) -> Result<Option<StockLevel>, StoreError>;

    /// Insert the first row for a key. Fails with
    /// [`StoreError::UniqueViolation`] when a row for the key exists or is
    /// committed concurrently.
    async fn insert(&mut self, level: &StockLevel) -> Result<(), StoreError>;

    /// Replace the row for `level.key()` only if its stored version still
    /// equals `expected`. Returns the number of rows affected (0 or 1).
    async fn update_if_version(
        &mut self,
        level: &StockLevel,
        expected: Version,
    ) -> Result<u64, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        (**self).begin().await
    }

    async fn get(&self, key: &StockKey) -> Result<Option<StockLevel>, StoreError> {
        (**self).get(key).await
    }
}
