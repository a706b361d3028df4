//! Operator surface: station credentials CRUD and the station list.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use hubsync_entities::NewStationCredential;

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_credentials).post(create_credential))
        .route(
            "/:id",
            get(get_credential)
                .put(replace_credential)
                .delete(delete_credential),
        )
}

pub async fn list_credentials(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    (
        StatusCode::OK,
        Json(services.domain.credentials.list()),
    )
        .into_response()
}

pub async fn create_credential(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<NewStationCredential>,
) -> axum::response::Response {
    match services.domain.credentials.create(body) {
        Ok(credential) => (StatusCode::CREATED, Json(credential)).into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

pub async fn get_credential(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match services.domain.credentials.get(id) {
        Some(credential) => (StatusCode::OK, Json(credential)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "credential not found"),
    }
}

pub async fn replace_credential(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
    Json(body): Json<NewStationCredential>,
) -> axum::response::Response {
    match services.domain.credentials.replace(id, body) {
        Ok(credential) => (StatusCode::OK, Json(credential)).into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

pub async fn delete_credential(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match services.domain.credentials.delete(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

pub async fn workstation_list(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    use hubsync_entities::StationDirectory as _;
    (
        StatusCode::OK,
        Json(services.domain.stations.all()),
    )
        .into_response()
}
