use axum::{Json, Router, extract::State, http::StatusCode, routing::{get, post}};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use vault_runtime::{ChainType, WalletSnapshot};

use super::error_response;
use crate::VaultApiState;

#[derive(Deserialize)]
pub struct WalletTypeRequest {
    pub chain_type: ChainType,
}

#[derive(Serialize)]
pub struct CreateWalletResponse {
    pub chain_type: ChainType,
    pub address: String,
}

pub fn router() -> Router<Arc<VaultApiState>> {
    Router::new()
        .route("/wallet", get(wallet))
        .route("/wallet/switch", post(switch))
        .route("/wallet/create", post(create))
}

async fn wallet(State(state): State<Arc<VaultApiState>>) -> Json<WalletSnapshot> {
    Json(state.ops.wallet().await)
}

async fn switch(
    State(state): State<Arc<VaultApiState>>,
    Json(request): Json<WalletTypeRequest>,
) -> Result<Json<WalletSnapshot>, (StatusCode, String)> {
    state
        .ops
        .switch_wallet_type(request.chain_type)
        .await
        .map_err(error_response)?;
    Ok(Json(state.ops.wallet().await))
}

async fn create(
    State(state): State<Arc<VaultApiState>>,
    Json(request): Json<WalletTypeRequest>,
) -> Result<Json<CreateWalletResponse>, (StatusCode, String)> {
    let address = state
        .ops
        .create_wallet(request.chain_type)
        .await
        .map_err(error_response)?;
    Ok(Json(CreateWalletResponse {
        chain_type: request.chain_type,
        address,
    }))
}
