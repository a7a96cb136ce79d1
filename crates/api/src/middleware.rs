use std::time::Duration;

use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;

use stockledger_core::ErrorCategory;

use crate::app::errors;
use crate::context::RequestDeadline;

pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

/// Turn the optional client timeout header into a [`RequestDeadline`].
pub async fn request_deadline(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let timeout = match parse_timeout(req.headers()) {
        Ok(timeout) => timeout,
        Err(message) => {
            return errors::json_error(StatusCode::BAD_REQUEST, ErrorCategory::Validation, message);
        }
    };

    req.extensions_mut()
        .insert(RequestDeadline::new(timeout.map(|t| Instant::now() + t)));

    next.run(req).await
}

fn parse_timeout(headers: &HeaderMap) -> Result<Option<Duration>, String> {
    let Some(value) = headers.get(REQUEST_TIMEOUT_HEADER) else {
        return Ok(None);
    };

    let millis: u64 = value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| format!("{REQUEST_TIMEOUT_HEADER} must be a positive integer"))?;

    if millis == 0 {
        return Err(format!("{REQUEST_TIMEOUT_HEADER} must be a positive integer"));
    }

    Ok(Some(Duration::from_millis(millis)))
}
