use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use vault_http_api::{VaultApiState, build_router};
use vault_runtime::chain::LocalWalletProvider;
use vault_runtime::{
    ChainType, FileWalletTypeStore, IdentityProvider, RuntimeConfig, VaultError, VaultOperations,
    WalletProvider, WalletSession,
};

/// Identity backed by the operator's local key. The Solana address, if
/// any, is supplied out of band; wallets cannot be created here.
struct LocalIdentity {
    wallet: Arc<LocalWalletProvider>,
    solana_address: Option<String>,
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    async fn resolve_address(&self, chain_type: ChainType) -> Result<Option<String>, VaultError> {
        Ok(match chain_type {
            ChainType::Ethereum => Some(format!("{:#x}", self.wallet.address())),
            ChainType::Solana => self.solana_address.clone(),
        })
    }

    async fn create_wallet(&self, chain_type: ChainType) -> Result<String, VaultError> {
        Err(VaultError::WalletUnavailable(format!(
            "cannot create a {} wallet with a local key",
            chain_type.as_str()
        )))
    }

    fn ethereum_provider(&self) -> Arc<dyn WalletProvider> {
        self.wallet.clone()
    }
}

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {}
}

fn required(key: &str) -> Result<String, VaultError> {
    std::env::var(key).map_err(|_| VaultError::ConfigError(format!("{key} must be set")))
}

#[tokio::main]
async fn main() -> Result<(), VaultError> {
    dotenvy::dotenv().ok();
    setup_log();

    // ── 1. Configuration ─────────────────────────────────────────────────────
    let config = RuntimeConfig::from_env()?;
    let rpc_url = required("VAULT_RPC_URL")?;
    let private_key = required("VAULT_PRIVATE_KEY")?;
    let chain_id: u64 = required("VAULT_CHAIN_ID")?
        .parse()
        .map_err(|e| VaultError::ConfigError(format!("VAULT_CHAIN_ID: {e}")))?;
    let network = std::env::var("VAULT_NETWORK").unwrap_or_else(|_| "base".to_string());
    let bind = std::env::var("VAULT_API_BIND").unwrap_or_else(|_| "0.0.0.0:9100".to_string());
    let api_token = required("VAULT_API_TOKEN")?;
    let state_dir = std::env::var("VAULT_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./state"));

    // ── 2. Wallet session ────────────────────────────────────────────────────
    let wallet = Arc::new(LocalWalletProvider::new(&rpc_url, &private_key, chain_id)?);
    tracing::info!(address = %wallet.address(), chain_id, "local signer loaded");
    let identity = Arc::new(LocalIdentity {
        wallet,
        solana_address: std::env::var("VAULT_SOLANA_ADDRESS").ok(),
    });
    let store = Arc::new(FileWalletTypeStore::in_dir(&state_dir));
    let session = WalletSession::new(identity, store, network);

    let ops = VaultOperations::new(config, session)?;
    let active = ops.login().await?;
    tracing::info!(active = active.as_str(), "wallet session restored");

    // ── 3. HTTP API ──────────────────────────────────────────────────────────
    let state = Arc::new(VaultApiState { ops, api_token });
    let router = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(bind.as_str())
        .await
        .map_err(|e| VaultError::ConfigError(format!("API bind {bind} failed: {e}")))?;
    tracing::info!("Vault API listening on {bind}");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {e}");
            }
        })
        .await;

    tracing::info!("Shutting down vault operations");
    state.ops.shutdown();
    if let Err(e) = served {
        tracing::error!("Vault API server error: {e}");
    }

    Ok(())
}
