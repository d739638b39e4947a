//! Integration tests for the vault HTTP API.
//!
//! Drives the real axum router with `oneshot`, backed by a scripted wallet
//! provider and an in-memory wallet-type store.

use std::sync::Arc;

use alloy::primitives::U256;
use axum::body::Body;
use http_body_util::BodyExt;
use hyper::Request;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vault_http_api::{VaultApiState, build_router};
use vault_runtime::mock::{MockWalletProvider, StaticIdentityProvider};
use vault_runtime::provider::methods;
use vault_runtime::wallet::MemoryWalletTypeStore;
use vault_runtime::{RuntimeConfig, VaultOperations, WalletSession};

const TEST_TOKEN: &str = "test-api-token-12345";
const USER: &str = "0x1111111111111111111111111111111111111111";

async fn test_state(mock: Arc<MockWalletProvider>) -> Arc<VaultApiState> {
    let config = RuntimeConfig {
        debounce_window: std::time::Duration::ZERO,
        ..RuntimeConfig::default()
    };
    test_state_with(mock, config).await
}

async fn test_state_with(mock: Arc<MockWalletProvider>, config: RuntimeConfig) -> Arc<VaultApiState> {
    let identity = Arc::new(StaticIdentityProvider::new(Some(USER), None, mock));
    let session = WalletSession::new(identity, Arc::new(MemoryWalletTypeStore::default()), "base");
    let ops = VaultOperations::new(config, session).expect("test operations");
    ops.login().await.expect("login");
    Arc::new(VaultApiState {
        ops,
        api_token: TEST_TOKEN.to_string(),
    })
}

fn auth_header() -> String {
    format!("Bearer {TEST_TOKEN}")
}

fn aave_vault() -> Value {
    json!({
        "asset_address": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
        "market_address": "0xA238Dd80C259a72e81d7e4664a9801593F98d1c5",
        "chain_id": 8453,
        "network": "base",
        "decimals": 6,
        "symbol": "USDC",
        "protocol": "aave",
        "pool_address": "0xA238Dd80C259a72e81d7e4664a9801593F98d1c5"
    })
}

const PENDLE_MARKET: &str = "0x5555555555555555555555555555555555555555";
const PENDLE_ROUTER: &str = "0x8888888888888888888888888888888888888888";

fn pendle_vault() -> Value {
    json!({
        "asset_address": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
        "market_address": PENDLE_MARKET,
        "chain_id": 8453,
        "network": "base",
        "decimals": 6,
        "symbol": "USDC",
        "protocol": "pendle",
        "pt_address": "0x2222222222222222222222222222222222222222",
        "yt_address": "0x3333333333333333333333333333333333333333"
    })
}

async fn pendle_state(server: &MockServer) -> Arc<VaultApiState> {
    let config = RuntimeConfig {
        debounce_window: std::time::Duration::ZERO,
        pendle_api_base: server.uri(),
        ..RuntimeConfig::default()
    };
    test_state_with(Arc::new(MockWalletProvider::new(8453)), config).await
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", auth_header())
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", auth_header())
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

// ── Auth ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_no_auth_required() {
    let app = build_router(test_state(Arc::new(MockWalletProvider::new(8453))).await);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_auth_required_for_routes() {
    let app = build_router(test_state(Arc::new(MockWalletProvider::new(8453))).await);
    let response = app
        .oneshot(Request::builder().uri("/wallet").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_wrong_token_rejected() {
    let app = build_router(test_state(Arc::new(MockWalletProvider::new(8453))).await);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/wallet")
                .header("authorization", "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

// ── Vault operations ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_deposit_success() {
    let mock = Arc::new(MockWalletProvider::new(8453));
    let app = build_router(test_state(mock.clone()).await);
    let response = app
        .oneshot(post("/vault/deposit", json!({ "vault": aave_vault(), "amount": "50" })))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert!(json["tx_hash"].is_string());
    assert_eq!(mock.count(methods::SEND_TRANSACTION), 2);
}

#[tokio::test]
async fn test_deposit_network_mismatch_reported_in_body() {
    let mock = Arc::new(MockWalletProvider::new(1));
    let app = build_router(test_state(mock.clone()).await);
    let response = app
        .oneshot(post("/vault/deposit", json!({ "vault": aave_vault(), "amount": "50" })))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "network_mismatch");
    assert!(json.get("tx_hash").is_none());
    assert_eq!(mock.mutating_requests(), 0);
}

#[tokio::test]
async fn test_withdraw_invalid_amount() {
    let app = build_router(test_state(Arc::new(MockWalletProvider::new(8453))).await);
    let response = app
        .oneshot(post("/vault/withdraw", json!({ "vault": aave_vault(), "amount": "abc" })))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_amount");
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let app = build_router(test_state(Arc::new(MockWalletProvider::new(8453))).await);
    let response = app
        .oneshot(post("/vault/deposit", json!({ "amount": "1" })))
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn test_quote_for_onchain_protocol_is_null() {
    let app = build_router(test_state(Arc::new(MockWalletProvider::new(8453))).await);
    let response = app
        .oneshot(post(
            "/vault/quote",
            json!({ "vault": aave_vault(), "amount": "5", "direction": "deposit" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(body_json(response).await["quote"].is_null());
}

#[tokio::test]
async fn test_pendle_quote_preview() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/core/v2/sdk/8453/markets/{PENDLE_MARKET}/swap")))
        .and(query_param("amountIn", "5000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tx": { "to": PENDLE_ROUTER, "data": "0xc81f847a", "value": "0" },
            "tokenApprovals": [{ "token": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", "spender": PENDLE_ROUTER }],
            "data": { "amountOut": "4990000" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = build_router(pendle_state(&server).await)
        .oneshot(post(
            "/vault/quote",
            json!({ "vault": pendle_vault(), "amount": "5", "direction": "deposit" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    assert_eq!(json["quote"]["approvals"].as_array().unwrap().len(), 1);
    assert_eq!(json["quote"]["tx"]["data"], "0xc81f847a");
}

#[tokio::test]
async fn test_pendle_quote_upstream_failure_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let response = build_router(pendle_state(&server).await)
        .oneshot(post(
            "/vault/quote",
            json!({ "vault": pendle_vault(), "amount": "5", "direction": "deposit" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn test_pendle_quote_below_minimum_skips_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let response = build_router(pendle_state(&server).await)
        .oneshot(post(
            "/vault/quote",
            json!({ "vault": pendle_vault(), "amount": "0.005", "direction": "deposit" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

// ── Balances ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_refresh_then_read_cached_balance() {
    let mock = Arc::new(MockWalletProvider::new(8453));
    mock.set_call_result(
        "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".parse().unwrap(),
        vault_runtime::encoder::selector_for(vault_runtime::encoder::sigs::BALANCE_OF).unwrap(),
        U256::from(12_501_234u64),
    );
    let state = test_state(mock).await;

    let response = build_router(state.clone())
        .oneshot(post("/balances/refresh", json!({ "vault": aave_vault(), "kind": "wallet" })))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    assert_eq!(json["decimals"], 6);
    assert_eq!(json["formatted"], "12.501234");
    assert_eq!(json["display"], "12.5012");

    let key = "wallet:8453:0x833589fcd6edb6e08f4c7c32d4f71b54bda02913:0x1111111111111111111111111111111111111111";
    let response = build_router(state)
        .oneshot(get(&format!("/balances/{key}")))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["key"], key);
    assert_eq!(json["balance"], "12.501234");
}

#[tokio::test]
async fn test_unknown_cache_key_is_null() {
    let app = build_router(test_state(Arc::new(MockWalletProvider::new(8453))).await);
    let response = app.oneshot(get("/balances/wallet:1:0x0:0x0")).await.unwrap();
    assert!(body_json(response).await["balance"].is_null());
}
