use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use tracing::debug;

use super::{ExecutionMode, ProtocolAdapter, read_uint, wrong_market};
use crate::amount::{self, AmountSpec};
use crate::approval::ApprovalOrchestrator;
use crate::encoder::{self, CallEncoder, sigs};
use crate::error::VaultError;
use crate::provider::WalletProvider;
use crate::types::{Call, CallPlan, ProtocolDetails, ProtocolKind, VaultMarketInfo};

/// Morpho vaults are ERC-4626: the market address is the vault itself.
/// Withdrawing everything redeems the full share balance rather than
/// passing a sentinel amount.
pub struct MorphoAdapter {
    encoder: CallEncoder,
    approvals: ApprovalOrchestrator,
}

impl MorphoAdapter {
    pub fn new(encoder: CallEncoder, approvals: ApprovalOrchestrator) -> Self {
        Self { encoder, approvals }
    }

    fn vault_address(vault: &VaultMarketInfo) -> Result<Address, VaultError> {
        match vault.details {
            ProtocolDetails::Morpho => Ok(vault.market_address),
            _ => Err(wrong_market(ProtocolKind::Morpho, vault)),
        }
    }

    /// `deposit(assets, receiver)`
    fn encode_deposit(&self, target: Address, assets: U256, receiver: Address) -> Result<Call, VaultError> {
        let data = self.encoder.encode(
            sigs::VAULT_DEPOSIT,
            &[encoder::uint256(assets), encoder::address(receiver)],
        )?;
        Ok(Call::new(target, data))
    }

    /// `withdraw(assets, receiver, owner)` or `redeem(shares, receiver, owner)`
    fn encode_exit(&self, target: Address, signature: &str, value: U256, owner: Address) -> Result<Call, VaultError> {
        let data = self.encoder.encode(
            signature,
            &[
                encoder::uint256(value),
                encoder::address(owner),
                encoder::address(owner),
            ],
        )?;
        Ok(Call::new(target, data))
    }
}

#[async_trait]
impl ProtocolAdapter for MorphoAdapter {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Morpho
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Direct
    }

    async fn plan_deposit(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
        amount: U256,
    ) -> Result<CallPlan, VaultError> {
        let target = Self::vault_address(vault)?;
        let mut plan = self
            .approvals
            .ensure_allowance(provider, owner, target, vault.asset_address, amount)
            .await?;
        plan.push(self.encode_deposit(target, amount, owner)?);
        Ok(plan)
    }

    async fn plan_withdraw(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
        amount: AmountSpec,
    ) -> Result<CallPlan, VaultError> {
        let target = Self::vault_address(vault)?;
        let call = match amount {
            AmountSpec::Exact(assets) => self.encode_exit(target, sigs::VAULT_WITHDRAW, assets, owner)?,
            AmountSpec::All => {
                let shares = read_uint(
                    provider,
                    &self.encoder,
                    target,
                    sigs::BALANCE_OF,
                    &[encoder::address(owner)],
                )
                .await?;
                if shares.is_zero() {
                    return Err(VaultError::InsufficientBalance {
                        have: "0".into(),
                        need: amount::WITHDRAW_ALL.into(),
                    });
                }
                debug!(%target, %shares, "redeeming full share balance");
                self.encode_exit(target, sigs::VAULT_REDEEM, shares, owner)?
            }
        };
        let mut plan = CallPlan::new();
        plan.push(call);
        Ok(plan)
    }

    async fn deposited_balance(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
    ) -> Result<U256, VaultError> {
        let target = Self::vault_address(vault)?;
        read_uint(provider, &self.encoder, target, sigs::VAULT_MAX_WITHDRAW, &[encoder::address(owner)]).await
    }
}
