//! Stock adjustment service.
//!
//! Thin orchestration over a [`StockLedger`]: validates the request, delegates
//! and translates engine outcomes into the [`AppError`] taxonomy.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::instrument;

use stockledger_core::{AppError, VariantId, WarehouseId};
use stockledger_inventory::{StockAdjustmentRequest, StockKey, StockLevel};

use crate::engine::{AdjustmentError, StockLedger};

#[derive(Clone)]
pub struct StockService {
    ledger: Arc<dyn StockLedger>,
}

impl StockService {
    pub fn new(ledger: Arc<dyn StockLedger>) -> Self {
        Self { ledger }
    }

    /// Apply `request.delta` to its pair.
    ///
    /// A zero delta is rejected before the ledger is touched.
    #[instrument(
        skip(self, request),
        fields(
            variant_id = %request.variant_id,
            warehouse_id = %request.warehouse_id,
            delta = request.delta
        ),
        err
    )]
    pub async fn adjust_stock(
        &self,
        request: &StockAdjustmentRequest,
        deadline: Option<Instant>,
    ) -> Result<StockLevel, AppError> {
        request.validate()?;

        self.ledger
            .adjust(request, deadline)
            .await
            .map_err(map_adjustment_error)
    }

    /// Current committed level for a pair.
    #[instrument(skip(self), err)]
    pub async fn stock_level(
        &self,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
    ) -> Result<StockLevel, AppError> {
        let key = StockKey::new(variant_id, warehouse_id);
        self.ledger
            .stock_level(key)
            .await
            .map_err(|e| AppError::internal("failed to read stock level", e))?
            .ok_or_else(|| AppError::not_found(format!("no stock level for {key}")))
    }
}

fn map_adjustment_error(err: AdjustmentError) -> AppError {
    match err {
        AdjustmentError::Validation(msg) => AppError::validation(msg),
        conflict @ AdjustmentError::Conflict(_) => AppError::conflict(conflict.to_string()),
        AdjustmentError::Internal { context, source } => {
            AppError::internal(format!("failed to adjust stock: {context}"), source)
        }
    }
}
