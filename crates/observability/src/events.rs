//! Structured adjustment events.
//!
//! The ledger reports every adjustment attempt and its outcome to an
//! [`AdjustmentObserver`]. Observers must not fail the caller: `record` returns
//! nothing and ledger correctness never depends on an observer being reachable.

use stockledger_core::{VariantId, WarehouseId};

/// One reported step of an adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentEvent {
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub delta: i64,
    pub outcome: AdjustmentOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustmentOutcome {
    /// The engine is about to open a transaction.
    Attempted,
    /// Committed; carries the resulting state.
    Succeeded { quantity: i64, version: u64 },
    /// Rejected by a business rule (negative stock, overflow).
    Rejected { reason: String },
    /// Lost an optimistic concurrency race.
    Conflicted { reason: String },
    /// Infrastructure failure (storage, deadline, transaction).
    Failed { reason: String },
}

impl AdjustmentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentOutcome::Attempted => "attempted",
            AdjustmentOutcome::Succeeded { .. } => "succeeded",
            AdjustmentOutcome::Rejected { .. } => "rejected",
            AdjustmentOutcome::Conflicted { .. } => "conflicted",
            AdjustmentOutcome::Failed { .. } => "failed",
        }
    }
}

/// Receiver of adjustment events.
pub trait AdjustmentObserver: Send + Sync {
    fn record(&self, event: &AdjustmentEvent);
}

impl<O> AdjustmentObserver for std::sync::Arc<O>
where
    O: AdjustmentObserver + ?Sized,
{
    fn record(&self, event: &AdjustmentEvent) {
        (**self).record(event)
    }
}

/// Observer that emits each event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AdjustmentObserver for TracingObserver {
    fn record(&self, event: &AdjustmentEvent) {
        let variant_id = event.variant_id.to_string();
        let warehouse_id = event.warehouse_id.to_string();
        let outcome = event.outcome.as_str();

        match &event.outcome {
            AdjustmentOutcome::Attempted => tracing::debug!(
                %variant_id,
                %warehouse_id,
                delta = event.delta,
                outcome,
                "stock adjustment attempted"
            ),
            AdjustmentOutcome::Succeeded { quantity, version } => tracing::info!(
                %variant_id,
                %warehouse_id,
                delta = event.delta,
                new_quantity = quantity,
                new_version = version,
                outcome,
                "stock adjusted"
            ),
            AdjustmentOutcome::Rejected { reason } => tracing::warn!(
                %variant_id,
                %warehouse_id,
                delta = event.delta,
                %reason,
                outcome,
                "stock adjustment rejected"
            ),
            AdjustmentOutcome::Conflicted { reason } => tracing::warn!(
                %variant_id,
                %warehouse_id,
                delta = event.delta,
                %reason,
                outcome,
                "stock modified concurrently"
            ),
            AdjustmentOutcome::Failed { reason } => tracing::error!(
                %variant_id,
                %warehouse_id,
                delta = event.delta,
                %reason,
                outcome,
                "stock adjustment failed"
            ),
        }
    }
}

/// Observer that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl AdjustmentObserver for NoopObserver {
    fn record(&self, _event: &AdjustmentEvent) {}
}
