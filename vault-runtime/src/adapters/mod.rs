pub mod aave;
pub mod compound;
pub mod morpho;
pub mod pendle;

use std::sync::Arc;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use crate::amount::AmountSpec;
use crate::approval::ApprovalOrchestrator;
use crate::config::RuntimeConfig;
use crate::encoder::CallEncoder;
use crate::error::VaultError;
use crate::executor::TransactionExecutor;
use crate::provider::{self, WalletProvider};
use crate::quote::{PendleClient, PendleQuote};
use crate::types::{CallPlan, Direction, ProtocolKind, VaultMarketInfo};

pub use aave::AaveAdapter;
pub use compound::CompoundAdapter;
pub use morpho::MorphoAdapter;
pub use pendle::PendleAdapter;

/// How a protocol's call plan reaches the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One `eth_sendTransaction` per call, each confirmed before the next.
    Direct,
    /// One sponsored batch under a single signature.
    Gasless,
}

/// Per-operation collaborators handed to an adapter.
pub struct AdapterContext<'a> {
    pub provider: Arc<dyn WalletProvider>,
    pub owner: Address,
    pub executor: &'a TransactionExecutor,
}

/// Common surface of a yield protocol.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn protocol(&self) -> ProtocolKind;

    fn execution_mode(&self) -> ExecutionMode;

    /// Smallest accepted amount in token units, if the protocol has one.
    fn min_amount(&self) -> Option<Decimal> {
        None
    }

    /// Ordered calls for depositing `amount` base units; approvals first.
    async fn plan_deposit(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
        amount: U256,
    ) -> Result<CallPlan, VaultError>;

    async fn plan_withdraw(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
        amount: AmountSpec,
    ) -> Result<CallPlan, VaultError>;

    /// Amount the owner currently has deposited, in asset base units.
    async fn deposited_balance(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
    ) -> Result<U256, VaultError>;

    /// Routing quote for protocols that price through an external API.
    async fn quote(
        &self,
        _provider: &dyn WalletProvider,
        _owner: Address,
        _vault: &VaultMarketInfo,
        _amount: AmountSpec,
        _direction: Direction,
    ) -> Result<Option<PendleQuote>, VaultError> {
        Ok(None)
    }

    /// Plan and submit a deposit; returns the transaction hash.
    async fn deposit(
        &self,
        ctx: &AdapterContext<'_>,
        vault: &VaultMarketInfo,
        amount: U256,
    ) -> Result<String, VaultError> {
        let plan = self
            .plan_deposit(ctx.provider.as_ref(), ctx.owner, vault, amount)
            .await?;
        info!(protocol = %self.protocol(), chain_id = vault.chain_id, calls = plan.len(), "deposit planned");
        ctx.executor
            .submit(&ctx.provider, ctx.owner, vault, &plan, self.execution_mode())
            .await
    }

    /// Plan and submit a withdrawal; returns the transaction hash.
    async fn withdraw(
        &self,
        ctx: &AdapterContext<'_>,
        vault: &VaultMarketInfo,
        amount: AmountSpec,
    ) -> Result<String, VaultError> {
        let plan = self
            .plan_withdraw(ctx.provider.as_ref(), ctx.owner, vault, amount)
            .await?;
        info!(protocol = %self.protocol(), chain_id = vault.chain_id, calls = plan.len(), "withdraw planned");
        ctx.executor
            .submit(&ctx.provider, ctx.owner, vault, &plan, self.execution_mode())
            .await
    }

    /// Abort background work such as pending quote refreshes.
    fn shutdown(&self) {}
}

/// Closed registry: one adapter per protocol kind.
pub struct AdapterRegistry {
    aave: Arc<AaveAdapter>,
    compound: Arc<CompoundAdapter>,
    pendle: Arc<PendleAdapter>,
    morpho: Arc<MorphoAdapter>,
}

impl AdapterRegistry {
    pub fn new(config: &RuntimeConfig, encoder: CallEncoder) -> Result<Self, VaultError> {
        let approvals = ApprovalOrchestrator::new(config.approval_policy, encoder);
        let pendle_client = PendleClient::new(
            config.pendle_api_base.clone(),
            config.slippage,
            config.quote_timeout,
        )?;
        Ok(Self {
            aave: Arc::new(AaveAdapter::new(encoder, approvals)),
            compound: Arc::new(CompoundAdapter::new(encoder, approvals)),
            pendle: Arc::new(PendleAdapter::new(
                pendle_client,
                encoder,
                approvals,
                config.pendle_min_amount,
                config.quote_ttl,
                config.debounce_window,
            )),
            morpho: Arc::new(MorphoAdapter::new(encoder, approvals)),
        })
    }

    pub fn get(&self, kind: ProtocolKind) -> Arc<dyn ProtocolAdapter> {
        match kind {
            ProtocolKind::Aave => self.aave.clone(),
            ProtocolKind::Compound => self.compound.clone(),
            ProtocolKind::Pendle => self.pendle.clone(),
            ProtocolKind::Morpho => self.morpho.clone(),
        }
    }

    pub fn shutdown(&self) {
        for kind in [
            ProtocolKind::Aave,
            ProtocolKind::Compound,
            ProtocolKind::Pendle,
            ProtocolKind::Morpho,
        ] {
            self.get(kind).shutdown();
        }
    }
}

/// Read a single uint256 from a view function.
pub(crate) async fn read_uint(
    provider: &dyn WalletProvider,
    encoder: &CallEncoder,
    target: Address,
    signature: &str,
    args: &[DynSolValue],
) -> Result<U256, VaultError> {
    let data = encoder.encode(signature, args)?;
    let raw = provider::eth_call(provider, target, &data).await?;
    provider::decode_uint(&raw)
}

pub(crate) fn wrong_market(expected: ProtocolKind, vault: &VaultMarketInfo) -> VaultError {
    VaultError::ConfigError(format!(
        "{} market {} routed to the {expected} adapter",
        vault.protocol(),
        vault.market_address
    ))
}
