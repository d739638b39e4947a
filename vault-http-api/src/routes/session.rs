use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::Deserialize;
use std::sync::Arc;

use vault_runtime::gasless::GaslessSession;

use super::error_response;
use crate::VaultApiState;

#[derive(Deserialize)]
pub struct InitSessionRequest {
    pub network: String,
    pub chain_id: u64,
}

pub fn router() -> Router<Arc<VaultApiState>> {
    Router::new().route("/session/init", post(init))
}

/// Concurrent calls for the same network share one initialization.
async fn init(
    State(state): State<Arc<VaultApiState>>,
    Json(request): Json<InitSessionRequest>,
) -> Result<Json<GaslessSession>, (StatusCode, String)> {
    let session = state
        .ops
        .initialize_session(&request.network, request.chain_id)
        .await
        .map_err(error_response)?;
    state.ops.set_network(&request.network).await;
    Ok(Json(*session))
}
