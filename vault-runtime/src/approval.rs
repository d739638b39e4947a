//! ERC-20 allowance checks that produce the approval half of a call plan.

use alloy::primitives::{Address, U256};
use tracing::debug;

use crate::config::ApprovalPolicy;
use crate::encoder::{self, CallEncoder, sigs};
use crate::error::VaultError;
use crate::provider::{self, WalletProvider};
use crate::types::{Call, CallPlan};

#[derive(Debug, Clone, Copy)]
pub struct ApprovalOrchestrator {
    policy: ApprovalPolicy,
    encoder: CallEncoder,
}

impl ApprovalOrchestrator {
    pub fn new(policy: ApprovalPolicy, encoder: CallEncoder) -> Self {
        Self { policy, encoder }
    }

    /// Current allowance of `spender` over `owner`'s `asset`.
    pub async fn allowance(
        &self,
        provider: &dyn WalletProvider,
        asset: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, VaultError> {
        let data = self.encoder.encode(
            sigs::ALLOWANCE,
            &[encoder::address(owner), encoder::address(spender)],
        )?;
        let raw = provider::eth_call(provider, asset, &data).await?;
        provider::decode_uint(&raw)
    }

    /// Approval calls needed before `spender` can pull `required` of
    /// `asset`; empty when the allowance already covers it.
    pub async fn ensure_allowance(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        spender: Address,
        asset: Address,
        required: U256,
    ) -> Result<CallPlan, VaultError> {
        let current = self.allowance(provider, asset, owner, spender).await?;
        let mut plan = CallPlan::new();
        if current >= required {
            debug!(%asset, %spender, %current, "allowance sufficient");
            return Ok(plan);
        }
        plan.push(self.approve_call(asset, spender, required)?);
        debug!(%asset, %spender, %current, %required, policy = ?self.policy, "approval required");
        Ok(plan)
    }

    /// The `approve` call this policy issues for `required`.
    pub fn approve_call(&self, asset: Address, spender: Address, required: U256) -> Result<Call, VaultError> {
        let amount = match self.policy {
            ApprovalPolicy::Max => U256::MAX,
            ApprovalPolicy::Exact => required,
        };
        let data = self.encoder.encode(
            sigs::APPROVE,
            &[encoder::address(spender), encoder::uint256(amount)],
        )?;
        Ok(Call::new(asset, data))
    }
}

impl Default for ApprovalOrchestrator {
    fn default() -> Self {
        Self::new(ApprovalPolicy::default(), CallEncoder::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::selector_for;
    use crate::mock::MockWalletProvider;

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    #[tokio::test]
    async fn test_insufficient_allowance_yields_max_approve() {
        let p = MockWalletProvider::new(8453);
        let orchestrator = ApprovalOrchestrator::default();
        let plan = orchestrator
            .ensure_allowance(&p, addr(1), addr(2), addr(3), U256::from(50u64))
            .await
            .unwrap();
        assert_eq!(plan.len(), 1);
        let call = &plan.calls()[0];
        assert_eq!(call.to, addr(3));
        assert_eq!(&call.data[..4], &selector_for(sigs::APPROVE).unwrap());
        assert_eq!(U256::from_be_slice(&call.data[36..68]), U256::MAX);
    }

    #[tokio::test]
    async fn test_allowance_idempotent_once_sufficient() {
        let p = MockWalletProvider::new(8453);
        let allowance_sel = selector_for(sigs::ALLOWANCE).unwrap();
        p.set_call_result(addr(3), allowance_sel, U256::MAX);
        let orchestrator = ApprovalOrchestrator::default();
        for _ in 0..2 {
            let plan = orchestrator
                .ensure_allowance(&p, addr(1), addr(2), addr(3), U256::from(50u64))
                .await
                .unwrap();
            assert!(plan.is_empty());
        }
        assert_eq!(p.mutating_requests(), 0);
    }

    #[tokio::test]
    async fn test_exact_policy() {
        let p = MockWalletProvider::new(8453);
        let orchestrator = ApprovalOrchestrator::new(ApprovalPolicy::Exact, CallEncoder::default());
        let plan = orchestrator
            .ensure_allowance(&p, addr(1), addr(2), addr(3), U256::from(50u64))
            .await
            .unwrap();
        assert_eq!(U256::from_be_slice(&plan.calls()[0].data[36..68]), U256::from(50u64));
    }
}
