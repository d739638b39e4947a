use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use vault_runtime::{TokenBalance, VaultMarketInfo};

use super::error_response;
use crate::VaultApiState;

const DISPLAY_DIGITS: u8 = 4;

#[derive(Serialize)]
pub struct CachedBalanceResponse {
    pub key: String,
    pub balance: Option<Decimal>,
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum BalanceKind {
    Wallet,
    Position,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub vault: VaultMarketInfo,
    pub kind: BalanceKind,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    #[serde(flatten)]
    pub balance: TokenBalance,
    pub formatted: Option<Decimal>,
    pub display: String,
}

pub fn router() -> Router<Arc<VaultApiState>> {
    Router::new()
        .route("/balances/refresh", post(refresh))
        .route("/balances/{key}", get(cached))
}

async fn cached(
    State(state): State<Arc<VaultApiState>>,
    Path(key): Path<String>,
) -> Json<CachedBalanceResponse> {
    let balance = state.ops.get_cached_balance(&key);
    Json(CachedBalanceResponse { key, balance })
}

async fn refresh(
    State(state): State<Arc<VaultApiState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, (StatusCode, String)> {
    let balance = match request.kind {
        BalanceKind::Wallet => state.ops.refresh_wallet_balance(&request.vault).await,
        BalanceKind::Position => state.ops.refresh_position(&request.vault).await,
    }
    .map_err(error_response)?;
    Ok(Json(RefreshResponse {
        formatted: balance.to_decimal(),
        display: balance.display(DISPLAY_DIGITS),
        balance,
    }))
}
