//! Adjustment engine behaviour against the in-memory store.
//!
//! Verifies:
//! - first insert, sequential updates and version progression
//! - negative results never mutate stored state
//! - same-pair races resolve to exactly one winner
//! - distinct pairs are independent
//! - deadlines and store failures surface as internal errors

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Barrier;
use tokio::time::Instant;

use stockledger_core::{StockLevelId, VariantId, Version, WarehouseId};
use stockledger_infra::engine::{AdjustmentEngine, AdjustmentError, StockLedger};
use stockledger_infra::stock_store::{
    InMemoryStockStore, InMemoryStockTx, RowLocking, StockStore, StockTransaction, StoreError,
};
use stockledger_inventory::{StockAdjustmentRequest, StockKey, StockLevel};
use stockledger_observability::{AdjustmentEvent, AdjustmentObserver, AdjustmentOutcome};

fn test_key() -> StockKey {
    StockKey::new(VariantId::new(), WarehouseId::new())
}

fn adjust(key: StockKey, delta: i64) -> StockAdjustmentRequest {
    StockAdjustmentRequest::new(key.variant_id, key.warehouse_id, delta)
}

fn seeded(store: &InMemoryStockStore, key: StockKey, quantity: i64) {
    let level = StockLevel::initialize(StockLevelId::new(), key, quantity, Utc::now()).unwrap();
    store.seed(level).unwrap();
}

/// Store whose locking read waits until every participant has read, so
/// concurrent adjusters are guaranteed to observe the same starting state.
#[derive(Clone)]
struct RendezvousStore {
    inner: InMemoryStockStore,
    barrier: Arc<Barrier>,
}

impl RendezvousStore {
    fn new(participants: usize) -> Self {
        Self {
            inner: InMemoryStockStore::with_row_locking(RowLocking::Disabled),
            barrier: Arc::new(Barrier::new(participants)),
        }
    }
}

struct RendezvousTx {
    inner: InMemoryStockTx,
    barrier: Arc<Barrier>,
}

#[async_trait]
impl StockStore for RendezvousStore {
    type Tx = RendezvousTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(RendezvousTx {
            inner: self.inner.begin().await?,
            barrier: self.barrier.clone(),
        })
    }

    async fn get(&self, key: &StockKey) -> Result<Option<StockLevel>, StoreError> {
        self.inner.get(key).await
    }
}

#[async_trait]
impl StockTransaction for RendezvousTx {
    async fn lock_for_update(&mut self, key: &StockKey) -> Result<Option<StockLevel>, StoreError> {
        let row = self.inner.lock_for_update(key).await?;
        self.barrier.wait().await;
        Ok(row)
    }

    async fn insert(&mut self, level: &StockLevel) -> Result<(), StoreError> {
        self.inner.insert(level).await
    }

    async fn update_if_version(
        &mut self,
        level: &StockLevel,
        expected: Version,
    ) -> Result<u64, StoreError> {
        self.inner.update_if_version(level, expected).await
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.inner.commit().await
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

/// Store that cannot open transactions.
struct UnreachableStore;

#[async_trait]
impl StockStore for UnreachableStore {
    type Tx = InMemoryStockTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn get(&self, _key: &StockKey) -> Result<Option<StockLevel>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<AdjustmentEvent>>,
}

impl RecordingObserver {
    fn outcomes(&self) -> Vec<AdjustmentOutcome> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.outcome.clone())
            .collect()
    }
}

impl AdjustmentObserver for RecordingObserver {
    fn record(&self, event: &AdjustmentEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[tokio::test]
async fn first_adjustment_creates_then_updates_then_rejects_overdraw() {
    let engine = AdjustmentEngine::new(InMemoryStockStore::new());
    let key = test_key();

    let created = engine.apply(&adjust(key, 5), None).await.unwrap();
    assert_eq!(created.quantity(), 5);
    assert_eq!(created.version().get(), 1);

    let drained = engine.apply(&adjust(key, -5), None).await.unwrap();
    assert_eq!(drained.quantity(), 0);
    assert_eq!(drained.version().get(), 2);
    assert_eq!(drained.id(), created.id());
    assert_eq!(drained.created_at(), created.created_at());

    let err = engine.apply(&adjust(key, -1), None).await.unwrap_err();
    assert!(matches!(err, AdjustmentError::Validation(_)), "got {err:?}");

    let stored = engine.store().get(&key).await.unwrap().unwrap();
    assert_eq!(stored.quantity(), 0);
    assert_eq!(stored.version().get(), 2);
}

#[tokio::test]
async fn negative_first_adjustment_creates_nothing() {
    let store = InMemoryStockStore::new();
    let engine = AdjustmentEngine::new(store.clone());
    let key = test_key();

    let err = engine.apply(&adjust(key, -3), None).await.unwrap_err();
    match err {
        AdjustmentError::Validation(msg) => assert!(msg.contains("cannot initialize negative stock")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn version_counts_committed_adjustments() {
    let engine = AdjustmentEngine::new(InMemoryStockStore::new());
    let key = test_key();

    let deltas = [4, -1, 7, -10, 3, 2, -5];
    let mut expected_quantity = 0;
    for (n, delta) in deltas.iter().enumerate() {
        let level = engine.apply(&adjust(key, *delta), None).await.unwrap();
        expected_quantity += delta;
        assert_eq!(level.version().get(), n as u64 + 1);
        assert_eq!(level.quantity(), expected_quantity);
    }
}

#[tokio::test]
async fn rejected_adjustment_leaves_row_untouched() {
    let store = InMemoryStockStore::new();
    let engine = AdjustmentEngine::new(store.clone());
    let key = test_key();
    seeded(&store, key, 3);
    let before = store.get(&key).await.unwrap().unwrap();

    let err = engine.apply(&adjust(key, -4), None).await.unwrap_err();
    assert!(matches!(err, AdjustmentError::Validation(_)));
    assert_eq!(store.get(&key).await.unwrap().unwrap(), before);

    // Row lock was released by the rollback.
    let level = engine
        .apply(&adjust(key, -3), Some(Instant::now() + Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(level.quantity(), 0);
}

#[tokio::test]
async fn same_version_race_yields_one_winner_and_one_conflict() {
    let store = RendezvousStore::new(2);
    let key = test_key();
    seeded(&store.inner, key, 10);
    let engine = Arc::new(AdjustmentEngine::new(store.clone()));

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.apply(&adjust(key, 3), None).await }
    });
    let second = tokio::spawn({
        let engine = engine.clone();
        async move { engine.apply(&adjust(key, 3), None).await }
    });
    let results = [first.await.unwrap(), second.await.unwrap()];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(AdjustmentError::Conflict(_))))
        .count();
    assert_eq!((winners, conflicts), (1, 1), "got {results:?}");

    let after_race = store.get(&key).await.unwrap().unwrap();
    assert_eq!(after_race.quantity(), 13);
    assert_eq!(after_race.version().get(), 2);

    // Re-issuing the conflicted delta against the new state succeeds.
    let retry = AdjustmentEngine::new(store.inner.clone());
    let level = retry.apply(&adjust(key, 3), None).await.unwrap();
    assert_eq!(level.quantity(), 16);
    assert_eq!(level.version().get(), 3);
}

#[tokio::test]
async fn concurrent_first_inserts_yield_one_row_and_one_conflict() {
    let store = RendezvousStore::new(2);
    let key = test_key();
    let engine = Arc::new(AdjustmentEngine::new(store.clone()));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.apply(&adjust(key, 10), None).await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let created: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(created.len(), 1, "got {results:?}");
    assert_eq!(created[0].quantity(), 10);
    assert_eq!(created[0].version().get(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(AdjustmentError::Conflict(_))))
    );

    let retry = AdjustmentEngine::new(store.inner.clone());
    let level = retry.apply(&adjust(key, 10), None).await.unwrap();
    assert_eq!(level.quantity(), 20);
    assert_eq!(level.version().get(), 2);
}

#[tokio::test]
async fn concurrent_adjustments_sum_to_final_quantity() {
    let store = InMemoryStockStore::new();
    let key = test_key();
    seeded(&store, key, 50);
    let engine = Arc::new(AdjustmentEngine::new(store.clone()));

    let deltas: Vec<i64> = (0..64)
        .map(|i| if i % 3 == 0 { -17 } else { 5 + i % 4 })
        .collect();

    let handles: Vec<_> = deltas
        .iter()
        .map(|delta| {
            let engine = engine.clone();
            let req = adjust(key, *delta);
            tokio::spawn(async move { (req.delta, engine.apply(&req, None).await) })
        })
        .collect();

    let mut applied = 0i64;
    let mut successes = 0u64;
    for handle in handles {
        let (delta, result) = handle.await.unwrap();
        match result {
            Ok(_) => {
                applied += delta;
                successes += 1;
            }
            Err(AdjustmentError::Validation(_)) => {}
            Err(other) => panic!("row-locked adjustments must not conflict: {other:?}"),
        }
    }

    let stored = store.get(&key).await.unwrap().unwrap();
    assert_eq!(stored.quantity(), 50 + applied);
    assert_eq!(stored.version().get(), 1 + successes);
    assert!(stored.quantity() >= 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn locked_concurrent_first_adjustments_create_one_row() {
    let store = InMemoryStockStore::new();
    let key = test_key();
    let engine = Arc::new(AdjustmentEngine::new(store.clone()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.apply(&adjust(key, 10), None).await })
        })
        .collect();

    let mut successes = 0i64;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AdjustmentError::Conflict(_)) => {}
            Err(other) => panic!("first adjustments may only succeed or conflict: {other:?}"),
        }
    }

    assert!(successes >= 1);
    assert_eq!(store.len(), 1);
    let stored = store.get(&key).await.unwrap().unwrap();
    assert_eq!(stored.quantity(), 10 * successes);
    assert_eq!(stored.version().get(), successes as u64);
}

#[tokio::test]
async fn held_row_lock_does_not_block_other_pairs() {
    let store = InMemoryStockStore::new();
    let (busy, idle) = (test_key(), test_key());
    seeded(&store, busy, 1);
    seeded(&store, idle, 1);
    let engine = AdjustmentEngine::new(store.clone());

    let mut holder = store.begin().await.unwrap();
    holder.lock_for_update(&busy).await.unwrap();

    let level = engine
        .apply(&adjust(idle, 1), Some(Instant::now() + Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(level.quantity(), 2);

    holder.rollback().await.unwrap();
}

#[tokio::test]
async fn caller_deadline_aborts_wait_on_row_lock() {
    let store = InMemoryStockStore::new();
    let key = test_key();
    seeded(&store, key, 8);
    let engine = AdjustmentEngine::new(store.clone());

    let mut holder = store.begin().await.unwrap();
    holder.lock_for_update(&key).await.unwrap();

    let err = engine
        .apply(&adjust(key, 1), Some(Instant::now() + Duration::from_millis(50)))
        .await
        .unwrap_err();
    match err {
        AdjustmentError::Internal { source, .. } => {
            assert!(matches!(source, StoreError::DeadlineExceeded(_)), "got {source:?}")
        }
        other => panic!("unexpected error: {other:?}"),
    }

    holder.rollback().await.unwrap();
    let stored = store.get(&key).await.unwrap().unwrap();
    assert_eq!(stored.quantity(), 8);
    assert_eq!(stored.version().get(), 1);
}

#[tokio::test]
async fn expired_deadline_applies_nothing() {
    let store = InMemoryStockStore::new();
    let key = test_key();
    let observer = Arc::new(RecordingObserver::default());
    let engine = AdjustmentEngine::with_observer(store.clone(), observer.clone());

    let err = engine
        .apply(&adjust(key, 5), Some(Instant::now() - Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdjustmentError::Internal {
            source: StoreError::DeadlineExceeded(_),
            ..
        }
    ));
    assert!(store.is_empty());

    let outcomes = observer.outcomes();
    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[1], AdjustmentOutcome::Failed { .. }));
}

#[tokio::test]
async fn db_timeout_bounds_calls_without_deadline() {
    let store = InMemoryStockStore::new();
    let key = test_key();
    seeded(&store, key, 8);
    let engine = AdjustmentEngine::new(store.clone()).with_db_timeout(Duration::from_millis(50));

    let mut holder = store.begin().await.unwrap();
    holder.lock_for_update(&key).await.unwrap();

    let err = engine.apply(&adjust(key, 1), None).await.unwrap_err();
    assert!(matches!(
        err,
        AdjustmentError::Internal {
            source: StoreError::DeadlineExceeded(_),
            ..
        }
    ));
}

#[tokio::test]
async fn unreachable_store_is_an_internal_error() {
    let engine = AdjustmentEngine::new(UnreachableStore);

    let err = engine.apply(&adjust(test_key(), 1), None).await.unwrap_err();
    match err {
        AdjustmentError::Internal { context, source } => {
            assert_eq!(context, "begin transaction");
            assert!(matches!(source, StoreError::Unavailable(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(engine.stock_level(test_key()).await.is_err());
}

#[tokio::test]
async fn observer_sees_attempt_and_one_outcome_per_call() {
    let observer = Arc::new(RecordingObserver::default());
    let engine = AdjustmentEngine::with_observer(InMemoryStockStore::new(), observer.clone());
    let key = test_key();

    engine.apply(&adjust(key, 5), None).await.unwrap();
    engine.apply(&adjust(key, -6), None).await.unwrap_err();

    let outcomes = observer.outcomes();
    assert_eq!(outcomes.len(), 4);
    assert_eq!(outcomes[0], AdjustmentOutcome::Attempted);
    assert_eq!(
        outcomes[1],
        AdjustmentOutcome::Succeeded {
            quantity: 5,
            version: 1
        }
    );
    assert_eq!(outcomes[2], AdjustmentOutcome::Attempted);
    assert!(matches!(outcomes[3], AdjustmentOutcome::Rejected { .. }));

    let events = observer.events.lock().unwrap();
    assert!(events.iter().all(|e| e.variant_id == key.variant_id && e.warehouse_id == key.warehouse_id));
}

#[tokio::test]
async fn ledger_read_returns_committed_state() {
    let engine = AdjustmentEngine::new(InMemoryStockStore::new());
    let key = test_key();

    assert!(engine.stock_level(key).await.unwrap().is_none());
    engine.apply(&adjust(key, 9), None).await.unwrap();

    let level = engine.stock_level(key).await.unwrap().unwrap();
    assert_eq!(level.quantity(), 9);
    assert_eq!(level.key(), key);
}
