use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use stockledger_core::{ErrorCategory, VariantId, WarehouseId};
use stockledger_infra::StockService;
use stockledger_inventory::StockAdjustmentRequest;

use crate::app::{dto, errors};
use crate::context::RequestDeadline;

pub async fn adjust_stock(
    Extension(services): Extension<Arc<StockService>>,
    Extension(deadline): Extension<RequestDeadline>,
    body: Result<Json<dto::AdjustStockRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                ErrorCategory::Validation,
                format!("invalid request body: {}", rejection.body_text()),
            );
        }
    };

    let request = StockAdjustmentRequest::from(body);
    match services.adjust_stock(&request, deadline.instant()).await {
        Ok(level) => (StatusCode::OK, Json(dto::StockLevelResponse::from(&level))).into_response(),
        Err(e) => errors::app_error_to_response(e),
    }
}

pub async fn get_stock_level(
    Extension(services): Extension<Arc<StockService>>,
    Path((variant_id, warehouse_id)): Path<(String, String)>,
) -> axum::response::Response {
    let variant_id: VariantId = match variant_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, ErrorCategory::Validation, "invalid variant id");
        }
    };
    let warehouse_id: WarehouseId = match warehouse_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, ErrorCategory::Validation, "invalid warehouse id");
        }
    };

    match services.stock_level(variant_id, warehouse_id).await {
        Ok(level) => (StatusCode::OK, Json(dto::StockLevelResponse::from(&level))).into_response(),
        Err(e) => errors::app_error_to_response(e),
    }
}
