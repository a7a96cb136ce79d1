//! Transactional row store boundary for stock levels.
//!
//! Defines the storage seam used by the adjustment engine: begin/commit/rollback,
//! a locking read, an insert guarded by the per-pair uniqueness constraint and a
//! compare-and-swap-on-version update.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryStockStore, InMemoryStockTx, RowLocking};
pub use postgres::{PostgresStockStore, PostgresStockTx};
pub use r#trait::{StockStore, StockTransaction, StoreError};
