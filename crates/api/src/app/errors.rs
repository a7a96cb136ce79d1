use std::error::Error as _;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockledger_core::{AppError, ErrorCategory};

pub fn app_error_to_response(err: AppError) -> axum::response::Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    match &err {
        AppError::Internal { .. } => {
            let cause = err.source().map(|s| s.to_string()).unwrap_or_default();
            tracing::error!(error = %err, %cause, "request failed");
        }
        _ => tracing::debug!(error = %err, category = %err.category(), "request rejected"),
    }

    json_error(status, err.category(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    category: ErrorCategory,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "code": status.as_u16(),
            "category": category.as_str(),
            "message": message.into(),
        })),
    )
        .into_response()
}
