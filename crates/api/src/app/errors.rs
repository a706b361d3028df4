//! Consistent JSON error responses.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use hubsync_core::SyncError;
use hubsync_ledger::LedgerError;

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

pub fn sync_error_to_response(err: SyncError) -> axum::response::Response {
    match err {
        SyncError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        SyncError::UnknownEntity(msg) => {
            json_error(StatusCode::BAD_REQUEST, "unknown_entity", msg)
        }
        SyncError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        SyncError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        SyncError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        SyncError::Unauthorized => {
            json_error(StatusCode::UNAUTHORIZED, "unauthorized", "unauthorized")
        }
    }
}

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    tracing::error!(error = %err, "ledger operation failed");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "ledger_error",
        err.to_string(),
    )
}
