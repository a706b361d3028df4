//! Authentication middleware: Api-Key for peers, bearer token for the
//! operator surface.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use hubsync_entities::CredentialStore;

use crate::context::StationContext;

#[derive(Clone)]
pub struct ApiKeyState {
    pub credentials: Arc<CredentialStore>,
}

/// `Authorization: Api-Key <token>` → station context.
pub async fn api_key_middleware(
    State(state): State<ApiKeyState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_api_key(req.headers())?;

    let station = state
        .credentials
        .resolve_api_key(token)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(StationContext::new(station));

    Ok(next.run(req).await)
}

fn extract_api_key(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !scheme.eq_ignore_ascii_case("api-key") {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

#[derive(Clone)]
pub struct OperatorState {
    pub token: Arc<str>,
}

/// `Authorization: Bearer <operator token>` for the maintenance surface.
pub async fn operator_middleware(
    State(state): State<OperatorState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let token = header
        .trim()
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?
        .trim();

    if token.is_empty() || token != &*state.token {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}
