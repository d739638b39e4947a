use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use super::{ExecutionMode, ProtocolAdapter, read_uint, wrong_market};
use crate::amount::AmountSpec;
use crate::approval::ApprovalOrchestrator;
use crate::encoder::{self, CallEncoder, sigs};
use crate::error::VaultError;
use crate::provider::WalletProvider;
use crate::types::{Call, CallPlan, ProtocolDetails, ProtocolKind, VaultMarketInfo};

/// Compound III (Comet). Approval and supply go out as one gasless batch.
pub struct CompoundAdapter {
    encoder: CallEncoder,
    approvals: ApprovalOrchestrator,
}

impl CompoundAdapter {
    pub fn new(encoder: CallEncoder, approvals: ApprovalOrchestrator) -> Self {
        Self { encoder, approvals }
    }

    fn comet(vault: &VaultMarketInfo) -> Result<Address, VaultError> {
        match vault.details {
            ProtocolDetails::Compound { comet_address } => Ok(comet_address),
            _ => Err(wrong_market(ProtocolKind::Compound, vault)),
        }
    }

    fn encode(&self, comet: Address, signature: &str, asset: Address, amount: U256) -> Result<Call, VaultError> {
        let data = self
            .encoder
            .encode(signature, &[encoder::address(asset), encoder::uint256(amount)])?;
        Ok(Call::new(comet, data))
    }
}

#[async_trait]
impl ProtocolAdapter for CompoundAdapter {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Compound
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Gasless
    }

    async fn plan_deposit(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
        amount: U256,
    ) -> Result<CallPlan, VaultError> {
        let comet = Self::comet(vault)?;
        let mut plan = self
            .approvals
            .ensure_allowance(provider, owner, comet, vault.asset_address, amount)
            .await?;
        plan.push(self.encode(comet, sigs::COMET_SUPPLY, vault.asset_address, amount)?);
        Ok(plan)
    }

    async fn plan_withdraw(
        &self,
        _provider: &dyn WalletProvider,
        _owner: Address,
        vault: &VaultMarketInfo,
        amount: AmountSpec,
    ) -> Result<CallPlan, VaultError> {
        let comet = Self::comet(vault)?;
        let mut plan = CallPlan::new();
        plan.push(self.encode(comet, sigs::COMET_WITHDRAW, vault.asset_address, amount.to_wei())?);
        Ok(plan)
    }

    async fn deposited_balance(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
    ) -> Result<U256, VaultError> {
        let comet = Self::comet(vault)?;
        read_uint(provider, &self.encoder, comet, sigs::BALANCE_OF, &[encoder::address(owner)]).await
    }
}
