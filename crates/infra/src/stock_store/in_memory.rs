use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use stockledger_core::{ExpectedVersion, Version};
use stockledger_inventory::{StockKey, StockLevel};

use super::r#trait::{StockStore, StockTransaction, StoreError};

/// How [`StockTransaction::lock_for_update`] behaves on the in-memory store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RowLocking {
    /// Locking reads take the row lock (`SELECT ... FOR UPDATE`).
    #[default]
    Exclusive,
    /// Locking reads degrade to plain reads, as under a weaker isolation
    /// level. Conditional writes still lock the row, as `UPDATE` does.
    Disabled,
}

#[derive(Debug, Default)]
struct Shared {
    rows: RwLock<HashMap<StockKey, StockLevel>>,
    locks: Mutex<HashMap<StockKey, Arc<RowLock<()>>>>,
}

impl Shared {
    fn row_lock(&self, key: &StockKey) -> Result<Arc<RowLock<()>>, StoreError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(locks.entry(*key).or_default().clone())
    }

    /// Drop the lock entry for `key` once no transaction holds or awaits it.
    fn forget_lock(&self, key: &StockKey) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    fn committed(&self, key: &StockKey) -> Result<Option<StockLevel>, StoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(rows.get(key).cloned())
    }

    fn publish(&self, staged: HashMap<StockKey, StockLevel>) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        rows.extend(staged);
        Ok(())
    }
}

/// In-memory transactional stock store.
///
/// Intended for tests/dev. Row locks are per-key async mutexes owned by the
/// transaction until it commits, rolls back or is dropped; staged writes become
/// visible to other readers atomically at commit. A key's lock entry lives only
/// while some transaction holds or waits for it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    shared: Arc<Shared>,
    locking: RowLocking,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row_locking(locking: RowLocking) -> Self {
        Self {
            shared: Arc::default(),
            locking,
        }
    }

    /// Load a committed row directly, bypassing transactions (fixtures).
    pub fn seed(&self, level: StockLevel) -> Result<(), StoreError> {
        let key = level.key();
        let mut rows = self
            .shared
            .rows
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        if rows.contains_key(&key) {
            return Err(StoreError::UniqueViolation(format!(
                "stock level for {key} already exists"
            )));
        }
        rows.insert(key, level);
        Ok(())
    }

    /// Number of committed rows.
    pub fn len(&self) -> usize {
        self.shared.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    type Tx = InMemoryStockTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(InMemoryStockTx {
            shared: self.shared.clone(),
            locking: self.locking,
            held: HashMap::new(),
            staged: HashMap::new(),
        })
    }

    async fn get(&self, key: &StockKey) -> Result<Option<StockLevel>, StoreError> {
        self.shared.committed(key)
    }
}

/// Row lock owned by a transaction; releases on drop.
struct HeldRow {
    key: StockKey,
    guard: Option<OwnedMutexGuard<()>>,
    shared: Arc<Shared>,
}

impl Drop for HeldRow {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.shared.forget_lock(&self.key);
    }
}

/// Open transaction on an [`InMemoryStockStore`].
pub struct InMemoryStockTx {
    shared: Arc<Shared>,
    locking: RowLocking,
    held: HashMap<StockKey, HeldRow>,
    staged: HashMap<StockKey, StockLevel>,
}

impl InMemoryStockTx {
    async fn acquire(&mut self, key: &StockKey) -> Result<(), StoreError> {
        if self.held.contains_key(key) {
            return Ok(());
        }
        // Created before the wait so a cancelled waiter still prunes the entry.
        let mut row = HeldRow {
            key: *key,
            guard: None,
            shared: self.shared.clone(),
        };
        row.guard = Some(self.shared.row_lock(key)?.lock_owned().await);
        self.held.insert(*key, row);
        Ok(())
    }

    /// Row as seen by this transaction: its own staged write, else committed state.
    fn visible(&self, key: &StockKey) -> Result<Option<StockLevel>, StoreError> {
        match self.staged.get(key) {
            Some(level) => Ok(Some(level.clone())),
            None => self.shared.committed(key),
        }
    }
}

#[async_trait]
impl StockTransaction for InMemoryStockTx {
    async fn lock_for_update(&mut self, key: &StockKey) -> Result<Option<StockLevel>, StoreError> {
        if self.locking == RowLocking::Disabled {
            return self.visible(key);
        }

        let already_held = self.held.contains_key(key);
        self.acquire(key).await?;
        let row = self.visible(key)?;
        if row.is_none() && !already_held {
            // Nothing to lock: release so a concurrent first insert can proceed.
            self.held.remove(key);
        }
        Ok(row)
    }

    async fn insert(&mut self, level: &StockLevel) -> Result<(), StoreError> {
        let key = level.key();
        // Waits for any transaction holding the key, like a unique index does.
        self.acquire(&key).await?;
        let existing = self.visible(&key)?.map(|row| row.version());
        if !ExpectedVersion::Absent.matches(existing) {
            return Err(StoreError::UniqueViolation(format!(
                "stock level for {key} already exists"
            )));
        }
        self.staged.insert(key, level.clone());
        Ok(())
    }

    async fn update_if_version(
        &mut self,
        level: &StockLevel,
        expected: Version,
    ) -> Result<u64, StoreError> {
        let key = level.key();
        self.acquire(&key).await?;
        let current = self.visible(&key)?.map(|row| row.version());
        if !ExpectedVersion::Exact(expected).matches(current) {
            return Ok(0);
        }
        self.staged.insert(key, level.clone());
        Ok(1)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        let staged = std::mem::take(&mut self.staged);
        self.shared.publish(staged)
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
