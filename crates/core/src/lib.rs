//! Shared building blocks of the stock ledger.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the optimistic-concurrency version token and the
//! error taxonomy shared by every layer.

pub mod error;
pub mod id;
pub mod version;

pub use error::{AppError, DomainError, DomainResult, ErrorCategory};
pub use id::{StockLevelId, VariantId, WarehouseId};
pub use version::{ExpectedVersion, Version};
