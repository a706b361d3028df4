//! GET /get-pending: deliver pending events and report distributed ones.

use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde_json::Value as JsonValue;

use hubsync_entities::StationDirectory;
use hubsync_registry::FileRendering;

use crate::app::dto::{OutboundChange, PendingResponse};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::StationContext;

pub async fn get_pending_changes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(station): Extension<StationContext>,
) -> axum::response::Response {
    let station_id = station.station_id();

    let pending = match services.ledger.pending_for(station_id).await {
        Ok(pending) => pending,
        Err(e) => return errors::ledger_error_to_response(e),
    };

    let pending_changes: Vec<OutboundChange> = pending
        .iter()
        .map(|event| {
            // Re-serialize against current object state so file fields
            // resolve to URLs; deleted or vanished objects fall back to
            // the stored payload verbatim.
            let payload = if event.action.is_delete() {
                event.payload.clone()
            } else {
                match services
                    .registry
                    .snapshot(&event.entity, &event.object_id, FileRendering::Url)
                {
                    Ok(Some(current)) => JsonValue::Object(current),
                    Ok(None) => event.payload.clone(),
                    Err(e) => {
                        tracing::warn!(event_id = %event.id, error = %e,
                                       "re-serialization failed; using stored payload");
                        event.payload.clone()
                    }
                }
            };
            OutboundChange::from_event(event, payload)
        })
        .collect();

    let acknowledged_events = match services.ledger.fully_acknowledged_from(station_id).await {
        Ok(ids) => ids.into_iter().map(|id| *id.as_uuid()).collect(),
        Err(e) => return errors::ledger_error_to_response(e),
    };

    services.domain.stations.touch_last_seen(station_id);

    (
        StatusCode::OK,
        Json(PendingResponse {
            pending_changes,
            acknowledged_events,
        }),
    )
        .into_response()
}
