//! Façade the UI layer calls. Owns the wallet session and the balance
//! cache; adapters only see them through the arguments passed per call.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::adapters::{AdapterContext, AdapterRegistry, ProtocolAdapter};
use crate::amount::{self, AmountSpec};
use crate::cache::{self, BalanceQuoteCache, TokenBalance};
use crate::config::RuntimeConfig;
use crate::encoder::{self, CallEncoder, sigs};
use crate::error::VaultError;
use crate::executor::TransactionExecutor;
use crate::gasless::GaslessSession;
use crate::provider::{self, WalletProvider};
use crate::quote::PendleQuote;
use crate::types::{ChainType, Direction, VaultMarketInfo, VaultOperationParams, VaultOperationResult};
use crate::wallet::{SessionState, WalletCreation, WalletSession};

/// Point-in-time view of the wallet session for display.
#[derive(Debug, Clone, Serialize)]
pub struct WalletSnapshot {
    #[serde(flatten)]
    pub state: SessionState,
    pub network: String,
    pub ethereum_address: Option<String>,
    pub solana_address: Option<String>,
}

pub struct VaultOperations {
    config: RuntimeConfig,
    encoder: CallEncoder,
    session: RwLock<WalletSession>,
    registry: AdapterRegistry,
    executor: TransactionExecutor,
    balances: BalanceQuoteCache<TokenBalance>,
}

impl VaultOperations {
    pub fn new(config: RuntimeConfig, session: WalletSession) -> Result<Self, VaultError> {
        config.validate()?;
        let encoder = CallEncoder::default();
        let registry = AdapterRegistry::new(&config, encoder)?;
        let executor = TransactionExecutor::new(&config)?;
        let balances = BalanceQuoteCache::new(config.debounce_window);
        Ok(Self {
            config,
            encoder,
            session: RwLock::new(session),
            registry,
            executor,
            balances,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub async fn login(&self) -> Result<ChainType, VaultError> {
        self.session.write().await.login().await
    }

    /// Deposit `params.amount` into the vault; never panics or throws,
    /// failures come back normalized in the result.
    pub async fn perform_deposit(&self, params: &VaultOperationParams) -> VaultOperationResult {
        let result = self.deposit(params).await;
        self.log_outcome("deposit", &params.vault, &result);
        result.into()
    }

    pub async fn perform_withdraw(&self, params: &VaultOperationParams) -> VaultOperationResult {
        let result = self.withdraw(params).await;
        self.log_outcome("withdraw", &params.vault, &result);
        result.into()
    }

    async fn deposit(&self, params: &VaultOperationParams) -> Result<String, VaultError> {
        let vault = &params.vault;
        let (owner, wallet) = self.signer(params.user_address).await?;
        let AmountSpec::Exact(amount) = amount::parse_amount(&params.amount, vault.decimals, false)? else {
            return Err(VaultError::InvalidAmount("'all' is only valid for withdrawals".into()));
        };
        let adapter = self.registry.get(vault.protocol());
        check_minimum(adapter.as_ref(), vault, amount)?;

        let key = cache::wallet_key(vault.chain_id, vault.asset_address, owner);
        if let Some(balance) = self.balances.get(&key) {
            check_covered(balance.raw, amount, vault.decimals)?;
        }

        self.executor.validator().ensure(wallet.as_ref(), vault.chain_id).await?;
        let ctx = AdapterContext {
            provider: wallet,
            owner,
            executor: &self.executor,
        };
        let tx_hash = adapter.deposit(&ctx, vault, amount).await?;
        self.invalidate(vault, owner);
        Ok(tx_hash)
    }

    async fn withdraw(&self, params: &VaultOperationParams) -> Result<String, VaultError> {
        let vault = &params.vault;
        let (owner, wallet) = self.signer(params.user_address).await?;
        let amount = amount::parse_amount(&params.amount, vault.decimals, true)?;
        let adapter = self.registry.get(vault.protocol());
        if let AmountSpec::Exact(v) = amount {
            check_minimum(adapter.as_ref(), vault, v)?;
        }

        let key = cache::position_key(vault.chain_id, vault.market_address, owner);
        if let Some(position) = self.balances.get(&key) {
            match amount {
                AmountSpec::Exact(v) => check_covered(position.raw, v, vault.decimals)?,
                AmountSpec::All if position.raw.is_zero() => {
                    return Err(VaultError::InsufficientBalance {
                        have: "0".into(),
                        need: amount::WITHDRAW_ALL.into(),
                    });
                }
                AmountSpec::All => {}
            }
        }

        self.executor.validator().ensure(wallet.as_ref(), vault.chain_id).await?;
        let ctx = AdapterContext {
            provider: wallet,
            owner,
            executor: &self.executor,
        };
        let tx_hash = adapter.withdraw(&ctx, vault, amount).await?;
        self.invalidate(vault, owner);
        Ok(tx_hash)
    }

    /// Active EVM address and signing provider. A caller-supplied address
    /// must match the active wallet.
    async fn signer(&self, expected: Option<Address>) -> Result<(Address, Arc<dyn WalletProvider>), VaultError> {
        let session = self.session.read().await;
        let owner = session.ethereum_address()?;
        if let Some(expected) = expected
            && expected != owner
        {
            return Err(VaultError::WalletUnavailable(format!(
                "requested address {expected} is not the active wallet {owner}"
            )));
        }
        Ok((owner, session.provider()))
    }

    fn invalidate(&self, vault: &VaultMarketInfo, owner: Address) {
        self.balances
            .invalidate(&cache::wallet_key(vault.chain_id, vault.asset_address, owner));
        self.balances
            .invalidate(&cache::position_key(vault.chain_id, vault.market_address, owner));
    }

    fn log_outcome(&self, op: &str, vault: &VaultMarketInfo, result: &Result<String, VaultError>) {
        match result {
            Ok(tx_hash) => info!(op, protocol = %vault.protocol(), chain_id = vault.chain_id, %tx_hash, "vault operation succeeded"),
            Err(e) => warn!(op, protocol = %vault.protocol(), chain_id = vault.chain_id, kind = ?e.kind(), error = %e, "vault operation failed"),
        }
    }

    /// Cached balance or position under `key`, in token units.
    pub fn get_cached_balance(&self, key: &str) -> Option<Decimal> {
        self.balances.get(key).and_then(|b| b.to_decimal())
    }

    /// Owner's wallet balance of the vault asset, refreshed through the cache.
    pub async fn refresh_wallet_balance(&self, vault: &VaultMarketInfo) -> Result<TokenBalance, VaultError> {
        let (owner, wallet) = self.signer(None).await?;
        let key = cache::wallet_key(vault.chain_id, vault.asset_address, owner);
        let call_encoder = self.encoder;
        let token = vault.asset_address;
        let decimals = vault.decimals;
        self.balances
            .refresh(&key, self.config.balance_ttl, move || {
                let wallet = wallet.clone();
                async move {
                    let data = call_encoder.encode(sigs::BALANCE_OF, &[encoder::address(owner)])?;
                    let raw = provider::eth_call(wallet.as_ref(), token, &data).await?;
                    Ok::<_, VaultError>(TokenBalance::new(provider::decode_uint(&raw)?, decimals))
                }
            })
            .await
    }

    /// Owner's deposited position in the vault, refreshed through the cache.
    pub async fn refresh_position(&self, vault: &VaultMarketInfo) -> Result<TokenBalance, VaultError> {
        let (owner, wallet) = self.signer(None).await?;
        let key = cache::position_key(vault.chain_id, vault.market_address, owner);
        let adapter = self.registry.get(vault.protocol());
        let vault = vault.clone();
        self.balances
            .refresh(&key, self.config.balance_ttl, move || {
                let wallet = wallet.clone();
                let adapter = adapter.clone();
                let vault = vault.clone();
                async move {
                    let raw = adapter.deposited_balance(wallet.as_ref(), owner, &vault).await?;
                    Ok::<_, VaultError>(TokenBalance::new(raw, vault.decimals))
                }
            })
            .await
    }

    /// Routing quote for display; `None` for protocols priced on-chain.
    pub async fn preview_quote(
        &self,
        vault: &VaultMarketInfo,
        amount: &str,
        direction: Direction,
    ) -> Result<Option<PendleQuote>, VaultError> {
        let (owner, wallet) = self.signer(None).await?;
        let parsed = amount::parse_amount(amount, vault.decimals, direction == Direction::Withdraw)?;
        self.registry
            .get(vault.protocol())
            .quote(wallet.as_ref(), owner, vault, parsed, direction)
            .await
    }

    /// Initialize the gasless session for `network` at most once; concurrent
    /// callers share the in-flight initialization.
    pub async fn initialize_session(&self, network: &str, chain_id: u64) -> Result<Arc<GaslessSession>, VaultError> {
        let (owner, wallet) = self.signer(None).await?;
        self.executor
            .gasless_session(&wallet, network, chain_id, owner)
            .await
    }

    pub async fn switch_wallet_type(&self, target: ChainType) -> Result<(), VaultError> {
        self.session.write().await.switch_wallet_type(target)?;
        self.executor.reset_sessions();
        Ok(())
    }

    /// The session lock is released while the identity provider creates
    /// the wallet, so `Creating` is observable and signing is not blocked.
    pub async fn create_wallet(&self, target: ChainType) -> Result<String, VaultError> {
        let identity = match self.session.write().await.begin_create(target)? {
            WalletCreation::Existing(address) => return Ok(address),
            WalletCreation::Started(identity) => identity,
        };
        let created = identity.create_wallet(target).await;
        self.session.write().await.finish_create(target, created)
    }

    pub async fn set_network(&self, network_key: &str) {
        self.session.write().await.set_network_key(network_key);
    }

    pub async fn wallet(&self) -> WalletSnapshot {
        let session = self.session.read().await;
        WalletSnapshot {
            state: session.state(),
            network: session.network_key().to_string(),
            ethereum_address: session.address(ChainType::Ethereum).map(str::to_string),
            solana_address: session.address(ChainType::Solana).map(str::to_string),
        }
    }

    /// Abort pending refreshes and forget initialized sessions.
    pub fn shutdown(&self) {
        self.balances.shutdown();
        self.registry.shutdown();
        self.executor.reset_sessions();
        debug!("vault operations shut down");
    }
}

fn check_minimum(adapter: &dyn ProtocolAdapter, vault: &VaultMarketInfo, amount: U256) -> Result<(), VaultError> {
    let Some(min) = adapter.min_amount() else {
        return Ok(());
    };
    if amount < amount::to_base_units(&min.to_string(), vault.decimals)? {
        return Err(VaultError::InvalidAmount(format!(
            "minimum {} amount is {min} {}",
            adapter.protocol(),
            vault.symbol
        )));
    }
    Ok(())
}

fn check_covered(have: U256, need: U256, decimals: u8) -> Result<(), VaultError> {
    if need > have {
        return Err(VaultError::InsufficientBalance {
            have: amount::from_base_units(have, decimals),
            need: amount::from_base_units(need, decimals),
        });
    }
    Ok(())
}
