//! Infrastructure layer: transactional stock store, adjustment engine and
//! service, configuration and Postgres wiring.

pub mod config;
pub mod db;
pub mod engine;
pub mod stock_service;
pub mod stock_store;

pub use config::{ConfigError, DatabaseConfig, LedgerConfig};
pub use engine::{AdjustmentEngine, AdjustmentError, StockLedger};
pub use stock_service::StockService;
pub use stock_store::{InMemoryStockStore, PostgresStockStore, RowLocking, StockStore, StockTransaction, StoreError};
