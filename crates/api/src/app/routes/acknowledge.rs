//! POST /acknowledge: confirm receipt of delivered events.

use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde_json::json;

use hubsync_core::EventId;

use crate::app::dto::AcknowledgeRequest;
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::StationContext;

pub async fn acknowledge_changes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(station): Extension<StationContext>,
    Json(body): Json<AcknowledgeRequest>,
) -> axum::response::Response {
    if body.acknowledged_events.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "acknowledged_events must not be empty",
        );
    }

    let event_ids: Vec<EventId> = body
        .acknowledged_events
        .iter()
        .map(|uuid| EventId::from_uuid(*uuid))
        .collect();

    let count = match services
        .ledger
        .acknowledge(station.station_id(), &event_ids)
        .await
    {
        Ok(count) => count,
        Err(e) => return errors::ledger_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "message": format!("{count} events acknowledged."),
        })),
    )
        .into_response()
}
