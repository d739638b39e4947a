use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use super::{ExecutionMode, ProtocolAdapter, read_uint, wrong_market};
use crate::amount::AmountSpec;
use crate::approval::ApprovalOrchestrator;
use crate::encoder::{self, CallEncoder, sigs};
use crate::error::VaultError;
use crate::provider::WalletProvider;
use crate::types::{Call, CallPlan, ProtocolDetails, ProtocolKind, VaultMarketInfo};

/// Aave V3 pool: approve then `supply`; `withdraw` takes `U256::MAX` for
/// the full position.
pub struct AaveAdapter {
    encoder: CallEncoder,
    approvals: ApprovalOrchestrator,
}

impl AaveAdapter {
    pub fn new(encoder: CallEncoder, approvals: ApprovalOrchestrator) -> Self {
        Self { encoder, approvals }
    }

    fn pool(vault: &VaultMarketInfo) -> Result<(Address, Option<Address>), VaultError> {
        match vault.details {
            ProtocolDetails::Aave {
                pool_address,
                a_token_address,
            } => Ok((pool_address, a_token_address)),
            _ => Err(wrong_market(ProtocolKind::Aave, vault)),
        }
    }

    /// `supply(asset, amount, onBehalfOf, referralCode = 0)`.
    fn encode_supply(&self, pool: Address, asset: Address, amount: U256, on_behalf_of: Address) -> Result<Call, VaultError> {
        let data = self.encoder.encode(
            sigs::AAVE_SUPPLY,
            &[
                encoder::address(asset),
                encoder::uint256(amount),
                encoder::address(on_behalf_of),
                encoder::uint16(0),
            ],
        )?;
        Ok(Call::new(pool, data))
    }

    /// `withdraw(asset, amount, to)`.
    fn encode_withdraw(&self, pool: Address, asset: Address, amount: U256, to: Address) -> Result<Call, VaultError> {
        let data = self.encoder.encode(
            sigs::AAVE_WITHDRAW,
            &[
                encoder::address(asset),
                encoder::uint256(amount),
                encoder::address(to),
            ],
        )?;
        Ok(Call::new(pool, data))
    }
}

#[async_trait]
impl ProtocolAdapter for AaveAdapter {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Aave
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
        let (pool, _) = Self::pool(vault)?;
        let mut plan = self
            .approvals
            .ensure_allowance(provider, owner, pool, vault.asset_address, amount)
            .await?;
        plan.push(self.encode_supply(pool, vault.asset_address, amount, owner)?);
        Ok(plan)
    }

    async fn plan_withdraw(
        &self,
        _provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
        amount: AmountSpec,
    ) -> Result<CallPlan, VaultError> {
        let (pool, _) = Self::pool(vault)?;
        let mut plan = CallPlan::new();
        plan.push(self.encode_withdraw(pool, vault.asset_address, amount.to_wei(), owner)?);
        Ok(plan)
    }

    async fn deposited_balance(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
    ) -> Result<U256, VaultError> {
        let (_, a_token) = Self::pool(vault)?;
        let a_token = a_token.ok_or_else(|| {
            VaultError::ConfigError(format!(
                "aToken address unknown for {} market {}",
                vault.symbol, vault.market_address
            ))
        })?;
        read_uint(provider, &self.encoder, a_token, sigs::BALANCE_OF, &[encoder::address(owner)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fixtures::{POOL, USDC, USER, addr, market};
    use crate::encoder::selector_for;
    use crate::mock::MockWalletProvider;
    use alloy::sol;
    use alloy::sol_types::SolCall;

    sol! {
        interface IPool {
            function supply(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
            function withdraw(address asset, uint256 amount, address to) external returns (uint256);
        }
    }

    fn adapter() -> AaveAdapter {
        AaveAdapter::new(CallEncoder::default(), ApprovalOrchestrator::default())
    }

    fn vault() -> VaultMarketInfo {
        market(
            ProtocolDetails::Aave {
                pool_address: addr(POOL),
                a_token_address: Some(Address::repeat_byte(0xaa)),
            },
            addr(POOL),
        )
    }

    #[tokio::test]
    async fn test_deposit_plan_approve_then_supply() {
        let p = MockWalletProvider::new(8453);
        let plan = adapter()
            .plan_deposit(&p, addr(USER), &vault(), U256::from(50_000_000u64))
            .await
            .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.calls()[0].to, addr(USDC));
        assert_eq!(&plan.calls()[0].data[..4], &selector_for(sigs::APPROVE).unwrap());

        let expected = IPool::supplyCall {
            asset: addr(USDC),
            amount: U256::from(50_000_000u64),
            onBehalfOf: addr(USER),
            referralCode: 0,
        }
        .abi_encode();
        assert_eq!(plan.calls()[1].to, addr(POOL));
        assert_eq!(plan.calls()[1].data.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn test_deposit_skips_approval_when_allowed() {
        let p = MockWalletProvider::new(8453);
        p.set_call_result(addr(USDC), selector_for(sigs::ALLOWANCE).unwrap(), U256::MAX);
        let plan = adapter()
            .plan_deposit(&p, addr(USER), &vault(), U256::from(1u64))
            .await
            .unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[tokio::test]
    async fn test_withdraw_all_uses_max_sentinel() {
        let p = MockWalletProvider::new(8453);
        let plan = adapter()
            .plan_withdraw(&p, addr(USER), &vault(), AmountSpec::All)
            .await
            .unwrap();
        let expected = IPool::withdrawCall {
            asset: addr(USDC),
            amount: U256::MAX,
            to: addr(USER),
        }
        .abi_encode();
        assert_eq!(plan.calls()[0].data.as_ref(), expected.as_slice());
        assert_eq!(p.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_deposited_balance_reads_a_token() {
        let p = MockWalletProvider::new(8453);
        p.set_call_result(
            Address::repeat_byte(0xaa),
            selector_for(sigs::BALANCE_OF).unwrap(),
            U256::from(75_000_000u64),
        );
        let bal = adapter().deposited_balance(&p, addr(USER), &vault()).await.unwrap();
        assert_eq!(bal, U256::from(75_000_000u64));
    }

    #[tokio::test]
    async fn test_rejects_foreign_market() {
        let p = MockWalletProvider::new(8453);
        let foreign = market(ProtocolDetails::Morpho, addr(POOL));
        assert!(adapter().plan_deposit(&p, addr(USER), &foreign, U256::from(1u64)).await.is_err());
    }
}
