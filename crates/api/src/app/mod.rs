//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/pipeline/worker wiring
//! - `routes/`: HTTP routes + handlers (one file per endpoint area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get, routing::post};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, build_services, migrate_if_durable, spawn_workers};

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let api_key_state = middleware::ApiKeyState {
        credentials: services.domain.credentials.clone(),
    };
    let operator_state = middleware::OperatorState {
        token: services.config.operator_token.as_str().into(),
    };

    // Peer routes: Api-Key authenticated, station context attached.
    let peer = Router::new()
        .route("/push", post(routes::push::push_changes))
        .route("/get-pending", get(routes::pending::get_pending_changes))
        .route("/acknowledge", post(routes::acknowledge::acknowledge_changes))
        .layer(axum::middleware::from_fn_with_state(
            api_key_state,
            middleware::api_key_middleware,
        ));

    // Operator routes: bearer-token authenticated.
    let operator = Router::new()
        .nest("/sync-configs", routes::configs::router())
        .route("/workstation-list", get(routes::configs::workstation_list))
        .layer(axum::middleware::from_fn_with_state(
            operator_state,
            middleware::operator_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(peer)
        .merge(operator)
        .layer(Extension(services))
}
