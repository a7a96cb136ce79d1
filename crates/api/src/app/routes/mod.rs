use axum::{
    Router,
    routing::{get, post},
};

pub mod stock;
pub mod system;

/// Router for the versioned stock endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/v1/stock/update", post(stock::adjust_stock))
        .route("/v1/stock/:variant_id/:warehouse_id", get(stock::get_stock_level))
}
