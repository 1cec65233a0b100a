//! Mapping of expense errors to HTTP responses.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use cofound_core::expense::{ErrorKind, ExpenseError};
use cofound_shared::AppError;
use serde_json::json;
use tracing::{debug, error};

/// Builds the `{ "error", "message" }` response for an expense error.
///
/// Rate-limited errors carry a `Retry-After` header and a `retry_after`
/// field. Store failures are logged and reported without details.
pub fn error_response(err: &ExpenseError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if err.kind() == ErrorKind::Infrastructure {
        error!(error = %err, "request failed on the store");
        return (
            status,
            Json(json!({
                "error": err.error_code(),
                "message": "An error occurred"
            })),
        )
            .into_response();
    }

    debug!(error = %err, code = err.error_code(), "request refused");

    let Some(retry_after) = err.retry_after() else {
        return (
            status,
            Json(json!({
                "error": err.error_code(),
                "message": err.to_string()
            })),
        )
            .into_response();
    };

    let mut response = (
        status,
        Json(json!({
            "error": err.error_code(),
            "message": err.to_string(),
            "retry_after": retry_after.to_rfc3339()
        })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&http_date(retry_after)) {
        response.headers_mut().insert(RETRY_AFTER, value);
    }
    response
}

/// Formats an instant as an IMF-fixdate, the form `Retry-After` expects.
fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Builds the response for an application-level error raised by this layer.
pub fn app_error_response(err: &AppError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(json!({
            "error": err.error_code(),
            "message": err.to_string()
        })),
    )
        .into_response()
}

/// Error returned for a malformed request field.
pub fn bad_request(message: &str) -> Response {
    app_error_response(&AppError::Validation(message.to_string()))
}
