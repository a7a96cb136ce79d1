//! Tracing, logging and adjustment outcome reporting (shared setup).

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(default_level: &str) {
    tracing::init(default_level);
}

/// Adjustment outcome events and the observer seam.
pub mod events;

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use events::{AdjustmentEvent, AdjustmentObserver, AdjustmentOutcome, NoopObserver, TracingObserver};
