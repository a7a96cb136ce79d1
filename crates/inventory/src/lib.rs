//! Inventory domain module: per-(variant, warehouse) stock levels.
//!
//! This crate contains the stock level record model and its transition rules,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod stock_level;

pub use stock_level::{StockAdjustmentRequest, StockKey, StockLevel};
