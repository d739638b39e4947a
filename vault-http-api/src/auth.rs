use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::VaultApiState;

/// Bearer-token gate for every route except `/health`.
pub async fn auth_middleware(
    State(state): State<Arc<VaultApiState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let authorized = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|header| header.strip_prefix("Bearer ").unwrap_or(header))
        .is_some_and(|token| !state.api_token.is_empty() && token == state.api_token);

    if authorized {
        Ok(next.run(request).await)
    } else {
        debug!(path = %request.uri().path(), "rejected unauthenticated request");
        Err(StatusCode::UNAUTHORIZED)
    }
}
