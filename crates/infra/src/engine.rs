//! Stock adjustment engine.
//!
//! Applies one signed delta to one `(variant, warehouse)` pair inside a single
//! store transaction:
//!
//! ```text
//! begin
//!   ↓
//! lock_for_update(key)          -- same-pair writers serialize here
//!   ↓
//! no row  → delta < 0 ? reject : insert {quantity: delta, version: 1}
//! row     → quantity + delta < 0 ? reject
//!           : update ... WHERE version = observed   -- 0 rows => conflict
//!   ↓
//! commit  (every failure path rolls back)
//! ```
//!
//! Both guards apply on every update. Per-pair updates stay linear even when
//! the store runs under an isolation level where the locking read does not
//! actually lock.
//!
//! A [`AdjustmentError::Conflict`] is returned to the caller as-is; the engine
//! never retries.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{instrument, warn};

use stockledger_core::{DomainError, StockLevelId};
use stockledger_inventory::{StockAdjustmentRequest, StockKey, StockLevel};
use stockledger_observability::{AdjustmentEvent, AdjustmentObserver, AdjustmentOutcome, TracingObserver};

use crate::stock_store::{StockStore, StockTransaction, StoreError};

/// Default upper bound on a single adjustment transaction.
pub const DEFAULT_DB_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome categories of a failed adjustment.
#[derive(Debug, Error)]
pub enum AdjustmentError {
    /// Business rejection (negative resulting stock, overflow). Never retried.
    #[error("{0}")]
    Validation(String),

    /// The pair was modified concurrently. Safe to re-issue the same delta.
    #[error("stock modified concurrently: {0}")]
    Conflict(String),

    /// Storage unavailable, deadline exceeded or transaction failure.
    #[error("{context}: {source}")]
    Internal {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl AdjustmentError {
    /// Classify a store failure: lost races are conflicts, the rest is internal.
    pub fn from_store(context: &'static str, source: StoreError) -> Self {
        match source {
            StoreError::UniqueViolation(msg) | StoreError::SerializationFailure(msg) => {
                AdjustmentError::Conflict(msg)
            }
            source => AdjustmentError::Internal { context, source },
        }
    }

    fn outcome(&self) -> AdjustmentOutcome {
        let reason = self.to_string();
        match self {
            AdjustmentError::Validation(_) => AdjustmentOutcome::Rejected { reason },
            AdjustmentError::Conflict(_) => AdjustmentOutcome::Conflicted { reason },
            AdjustmentError::Internal { .. } => AdjustmentOutcome::Failed { reason },
        }
    }
}

impl From<DomainError> for AdjustmentError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                AdjustmentError::Validation(msg)
            }
            other => AdjustmentError::Internal {
                context: "domain invariant",
                source: StoreError::Corrupt(other.to_string()),
            },
        }
    }
}

/// Object-safe view of the ledger consumed by the service layer.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Apply `request.delta` atomically; see [`AdjustmentEngine::apply`].
    async fn adjust(
        &self,
        request: &StockAdjustmentRequest,
        deadline: Option<Instant>,
    ) -> Result<StockLevel, AdjustmentError>;

    /// Unlocked read of the committed row for `key`.
    async fn stock_level(&self, key: StockKey) -> Result<Option<StockLevel>, StoreError>;
}

/// Transactional adjustment engine over a [`StockStore`].
#[derive(Debug, Clone)]
pub struct AdjustmentEngine<S, O = TracingObserver> {
    store: S,
    observer: O,
    db_timeout: Duration,
}

impl<S> AdjustmentEngine<S, TracingObserver>
where
    S: StockStore,
{
    pub fn new(store: S) -> Self {
        Self::with_observer(store, TracingObserver)
    }
}

impl<S, O> AdjustmentEngine<S, O>
where
    S: StockStore,
    O: AdjustmentObserver,
{
    pub fn with_observer(store: S, observer: O) -> Self {
        Self {
            store,
            observer,
            db_timeout: DEFAULT_DB_TIMEOUT,
        }
    }

    /// Upper bound applied to every transaction, on top of caller deadlines.
    pub fn with_db_timeout(mut self, db_timeout: Duration) -> Self {
        self.db_timeout = db_timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply one signed delta to one pair.
    ///
    /// The transaction runs until the earlier of `deadline` and the configured
    /// DB timeout. When that instant passes while waiting on the row lock or
    /// the commit, the transaction is dropped (rolled back) and the call fails
    /// with [`AdjustmentError::Internal`] wrapping
    /// [`StoreError::DeadlineExceeded`]. A deadline that has already passed
    /// fails before a transaction is opened.
    ///
    /// A deadline that fires while `commit` is in flight on a remote store
    /// still reports `Internal`, but the server may have committed. Read the
    /// pair back before treating such a failure as not applied.
    #[instrument(
        skip(self, request),
        fields(
            variant_id = %request.variant_id,
            warehouse_id = %request.warehouse_id,
            delta = request.delta
        )
    )]
    pub async fn apply(
        &self,
        request: &StockAdjustmentRequest,
        deadline: Option<Instant>,
    ) -> Result<StockLevel, AdjustmentError> {
        self.report(request, AdjustmentOutcome::Attempted);

        let started = Instant::now();
        let budget = started + self.db_timeout;
        let deadline = deadline.map_or(budget, |d| d.min(budget));

        let result = if started >= deadline {
            Err(deadline_exceeded(started))
        } else {
            match tokio::time::timeout_at(deadline, self.apply_in_transaction(request)).await {
                Ok(result) => result,
                Err(_) => Err(deadline_exceeded(started)),
            }
        };

        let outcome = match &result {
            Ok(level) => AdjustmentOutcome::Succeeded {
                quantity: level.quantity(),
                version: level.version().get(),
            },
            Err(err) => err.outcome(),
        };
        self.report(request, outcome);

        result
    }

    async fn apply_in_transaction(
        &self,
        request: &StockAdjustmentRequest,
    ) -> Result<StockLevel, AdjustmentError> {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| AdjustmentError::from_store("begin transaction", e))?;

        match Self::stage(&mut tx, request).await {
            Ok(level) => {
                tx.commit()
                    .await
                    .map_err(|e| AdjustmentError::from_store("commit transaction", e))?;
                Ok(level)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed adjustment did not complete");
                }
                Err(err)
            }
        }
    }

    /// Read-lock-check-write inside an open transaction. Does not commit.
    async fn stage(
        tx: &mut S::Tx,
        request: &StockAdjustmentRequest,
    ) -> Result<StockLevel, AdjustmentError> {
        let key = request.key();
        let current = tx
            .lock_for_update(&key)
            .await
            .map_err(|e| AdjustmentError::from_store("lock stock level", e))?;
        let now = Utc::now();

        match current {
            None => {
                let level = StockLevel::initialize(StockLevelId::new(), key, request.delta, now)?;
                tx.insert(&level)
                    .await
                    .map_err(|e| AdjustmentError::from_store("insert stock level", e))?;
                Ok(level)
            }
            Some(current) => {
                let next = current.adjusted(request.delta, now)?;
                let affected = tx
                    .update_if_version(&next, current.version())
                    .await
                    .map_err(|e| AdjustmentError::from_store("update stock level", e))?;
                if affected == 0 {
                    return Err(AdjustmentError::Conflict(format!(
                        "version {} of {key} is no longer current",
                        current.version()
                    )));
                }
                Ok(next)
            }
        }
    }

    fn report(&self, request: &StockAdjustmentRequest, outcome: AdjustmentOutcome) {
        self.observer.record(&AdjustmentEvent {
            variant_id: request.variant_id,
            warehouse_id: request.warehouse_id,
            delta: request.delta,
            outcome,
        });
    }
}

fn deadline_exceeded(started: Instant) -> AdjustmentError {
    AdjustmentError::Internal {
        context: "adjust stock",
        source: StoreError::DeadlineExceeded(started.elapsed()),
    }
}

#[async_trait]
impl<S, O> StockLedger for AdjustmentEngine<S, O>
where
    S: StockStore,
    O: AdjustmentObserver,
{
    async fn adjust(
        &self,
        request: &StockAdjustmentRequest,
        deadline: Option<Instant>,
    ) -> Result<StockLevel, AdjustmentError> {
        self.apply(request, deadline).await
    }

    async fn stock_level(&self, key: StockKey) -> Result<Option<StockLevel>, StoreError> {
        self.store.get(&key).await
    }
}
