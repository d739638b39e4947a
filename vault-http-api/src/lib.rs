pub mod auth;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;

use vault_runtime::VaultOperations;

pub struct VaultApiState {
    pub ops: VaultOperations,
    pub api_token: String,
}

pub fn build_router(state: Arc<VaultApiState>) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::vault::router())
        .merge(routes::balances::router())
        .merge(routes::wallet::router())
        .merge(routes::session::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
