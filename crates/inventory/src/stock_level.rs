use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, StockLevelId, VariantId, Version, WarehouseId};

/// Key of a stock level: exactly one row exists per pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
}

impl StockKey {
    pub fn new(variant_id: VariantId, warehouse_id: WarehouseId) -> Self {
        Self {
            variant_id,
            warehouse_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.variant_id, self.warehouse_id)
    }
}

/// Persisted stock level of one variant in one warehouse.
///
/// Invariants (enforced by every constructor):
/// - `quantity >= 0`
/// - `version >= 1`, advanced by exactly one per committed mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    id: StockLevelId,
    variant_id: VariantId,
    warehouse_id: WarehouseId,
    quantity: i64,
    version: Version,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StockLevel {
    /// First row of a pair, created by its first successful adjustment.
    pub fn initialize(
        id: StockLevelId,
        key: StockKey,
        delta: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if delta < 0 {
            return Err(DomainError::validation("cannot initialize negative stock"));
        }
        Ok(Self {
            id,
            variant_id: key.variant_id,
            warehouse_id: key.warehouse_id,
            quantity: delta,
            version: Version::INITIAL,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rehydrate a row read from storage.
    pub fn from_parts(
        id: StockLevelId,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        quantity: i64,
        version: u64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity < 0 {
            return Err(DomainError::invariant(format!(
                "stored quantity is negative ({quantity})"
            )));
        }
        let version = Version::new(version)?;
        Ok(Self {
            id,
            variant_id,
            warehouse_id,
            quantity,
            version,
            created_at,
            updated_at,
        })
    }

    /// Next state after applying `delta`.
    ///
    /// The current value is left untouched; callers persist the returned row
    /// conditionally on `self.version()`.
    pub fn adjusted(&self, delta: i64, now: DateTime<Utc>) -> DomainResult<Self> {
        let quantity = self.quantity.checked_add(delta).ok_or_else(|| {
            DomainError::validation("adjustment would overflow the stock quantity")
        })?;
        if quantity < 0 {
            return Err(DomainError::validation(format!(
                "adjustment would result in negative stock (current: {}, delta: {delta})",
                self.quantity
            )));
        }
        Ok(Self {
            quantity,
            version: self.version.next(),
            updated_at: now,
            ..self.clone()
        })
    }

    pub fn id(&self) -> StockLevelId {
        self.id
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.variant_id, self.warehouse_id)
    }

    pub fn variant_id(&self) -> VariantId {
        self.variant_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Request to apply a signed delta to one pair. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustmentRequest {
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub delta: i64,
}

impl StockAdjustmentRequest {
    pub fn new(variant_id: VariantId, warehouse_id: WarehouseId, delta: i64) -> Self {
        Self {
            variant_id,
            warehouse_id,
            delta,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.variant_id, self.warehouse_id)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.delta == 0 {
            return Err(DomainError::validation("stock adjustment delta cannot be zero"));
        }
        Ok(())
    }
}
