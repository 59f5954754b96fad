use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use warden_core::AuthError;

/// Map a domain error to a consistent JSON error response.
///
/// `Internal` deliberately carries only a correlation id outward; the detail
/// already went to the logs when the error was constructed.
pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::Unauthorized(msg) => json_error(StatusCode::UNAUTHORIZED, "unauthorized", msg),
        AuthError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        AuthError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        AuthError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        AuthError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        AuthError::Internal { correlation_id } => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            format!("internal error (correlation id {correlation_id})"),
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
