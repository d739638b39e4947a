use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use vault_runtime::quote::PendleQuote;
use vault_runtime::{Direction, VaultMarketInfo, VaultOperationParams, VaultOperationResult};

use super::error_response;
use crate::VaultApiState;

#[derive(Deserialize)]
pub struct QuoteRequest {
    pub vault: VaultMarketInfo,
    pub amount: String,
    pub direction: Direction,
}

#[derive(Serialize)]
pub struct QuoteResponse {
    pub quote: Option<PendleQuote>,
}

pub fn router() -> Router<Arc<VaultApiState>> {
    Router::new()
        .route("/vault/deposit", post(deposit))
        .route("/vault/withdraw", post(withdraw))
        .route("/vault/quote", post(quote))
}

/// Operation failures come back as a 200 with `success: false`.
async fn deposit(
    State(state): State<Arc<VaultApiState>>,
    Json(params): Json<VaultOperationParams>,
) -> Json<VaultOperationResult> {
    Json(state.ops.perform_deposit(&params).await)
}

async fn withdraw(
    State(state): State<Arc<VaultApiState>>,
    Json(params): Json<VaultOperationParams>,
) -> Json<VaultOperationResult> {
    Json(state.ops.perform_withdraw(&params).await)
}

async fn quote(
    State(state): State<Arc<VaultApiState>>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, (StatusCode, String)> {
    let quote = state
        .ops
        .preview_quote(&request.vault, &request.amount, request.direction)
        .await
        .map_err(error_response)?;
    Ok(Json(QuoteResponse { quote }))
}
