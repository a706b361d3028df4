//! POST /push: accept a batch of changes from a peer station.

use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde_json::json;

use hubsync_jobs::{Job, JobKind};
use hubsync_pipelines::{IngestJob, InboundChange, validate_changes};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::StationContext;

pub async fn push_changes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(station): Extension<StationContext>,
    Json(changes): Json<Vec<InboundChange>>,
) -> axum::response::Response {
    if changes.is_empty() {
        return (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "message": "No changes processed.",
            })),
        )
            .into_response();
    }

    if let Err(item_errors) = validate_changes(&services.registry, &changes) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "errors": item_errors })),
        )
            .into_response();
    }

    let batch_size = changes.len();
    let envelope = IngestJob {
        source_station_id: station.station_id(),
        changes,
    };
    let payload = match serde_json::to_value(&envelope) {
        Ok(payload) => payload,
        Err(e) => {
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "envelope_error",
                e.to_string(),
            );
        }
    };

    let job = Job::new(JobKind::Ingest, payload)
        .with_retry_policy(services.config.ingest_retry.clone());
    let task_id = match services.jobs.enqueue(job) {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "failed to enqueue ingest job");
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "queue_error",
                e.to_string(),
            );
        }
    };

    tracing::info!(
        station = %station.station_id(),
        batch = batch_size,
        task_id = %task_id,
        "accepted pushed batch"
    );

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "message": format!("Batch of {batch_size} changes accepted for processing."),
            "task_id": task_id,
            "info": "Per-change outcomes are reported in the worker logs.",
        })),
    )
        .into_response()
}
