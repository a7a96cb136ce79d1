use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{StockLevelId, VariantId, WarehouseId};
use stockledger_inventory::{StockAdjustmentRequest, StockLevel};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub delta: i64,
}

impl From<AdjustStockRequest> for StockAdjustmentRequest {
    fn from(body: AdjustStockRequest) -> Self {
        StockAdjustmentRequest::new(body.variant_id, body.warehouse_id, body.delta)
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct StockLevelResponse {
    pub id: StockLevelId,
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&StockLevel> for StockLevelResponse {
    fn from(level: &StockLevel) -> Self {
        Self {
            id: level.id(),
            variant_id: level.variant_id(),
            warehouse_id: level.warehouse_id(),
            quantity: level.quantity(),
            version: level.version().get(),
            created_at: level.created_at(),
            updated_at: level.updated_at(),
        }
    }
}
