//! Submission pipeline: takes an adapter's call plan to the chain either
//! call-by-call from the user's wallet or as one sponsored batch.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use tracing::{debug, info, warn};

use crate::adapters::ExecutionMode;
use crate::config::RuntimeConfig;
use crate::error::VaultError;
use crate::gasless::{GaslessBatchExecutor, GaslessSession};
use crate::guard::{AdapterSessionGuard, SessionKey};
use crate::network::NetworkValidator;
use crate::provider::{self, WalletProvider};
use crate::types::{CallPlan, VaultMarketInfo};

pub struct TransactionExecutor {
    validator: NetworkValidator,
    gasless: Arc<GaslessBatchExecutor>,
    sessions: AdapterSessionGuard<GaslessSession>,
    receipt_poll_interval: Duration,
    receipt_max_attempts: u32,
    route_all_via_gasless: bool,
}

impl TransactionExecutor {
    pub fn new(config: &RuntimeConfig) -> Result<Self, VaultError> {
        let gasless = GaslessBatchExecutor::new(config.gasless.clone(), config.quote_timeout)?;
        Ok(Self {
            validator: NetworkValidator::new(config.auto_switch_network),
            gasless: Arc::new(gasless),
            sessions: AdapterSessionGuard::new(),
            receipt_poll_interval: config.receipt_poll_interval,
            receipt_max_attempts: config.receipt_max_attempts.max(1),
            route_all_via_gasless: config.route_all_via_gasless,
        })
    }

    pub fn validator(&self) -> NetworkValidator {
        self.validator
    }

    /// Submit `plan` for `owner` on the vault's chain; returns the hash of
    /// the last transaction (direct) or the relay's hash (gasless).
    pub async fn submit(
        &self,
        provider: &Arc<dyn WalletProvider>,
        owner: Address,
        vault: &VaultMarketInfo,
        plan: &CallPlan,
        mode: ExecutionMode,
    ) -> Result<String, VaultError> {
        if plan.is_empty() {
            return Err(VaultError::Unknown("nothing to submit".into()));
        }
        let mode = if self.route_all_via_gasless {
            ExecutionMode::Gasless
        } else {
            mode
        };
        match mode {
            ExecutionMode::Direct => self.submit_direct(provider.as_ref(), owner, vault, plan).await,
            ExecutionMode::Gasless => self.submit_gasless(provider, owner, vault, plan).await,
        }
    }

    async fn submit_direct(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
        plan: &CallPlan,
    ) -> Result<String, VaultError> {
        let mut last_hash = String::new();
        for (index, call) in plan.calls().iter().enumerate() {
            self.validator.ensure(provider, vault.chain_id).await?;
            let tx_hash = provider::send_transaction(provider, owner, call).await?;
            debug!(index, to = %call.to, %tx_hash, "transaction sent");
            self.wait_for_receipt(provider, &tx_hash).await?;
            last_hash = tx_hash;
        }
        info!(chain_id = vault.chain_id, calls = plan.len(), tx_hash = %last_hash, "plan confirmed");
        Ok(last_hash)
    }

    /// Polls until the receipt is known. A reverted receipt fails the plan
    /// so later calls never run against a failed approval.
    async fn wait_for_receipt(&self, provider: &dyn WalletProvider, tx_hash: &str) -> Result<(), VaultError> {
        for attempt in 1..=self.receipt_max_attempts {
            match provider::receipt_status(provider, tx_hash).await? {
                Some(true) => return Ok(()),
                Some(false) => {
                    warn!(%tx_hash, "transaction reverted");
                    return Err(VaultError::ExecutionReverted(format!("transaction {tx_hash} reverted")));
                }
                None => {
                    debug!(%tx_hash, attempt, "receipt pending");
                    if attempt < self.receipt_max_attempts {
                        tokio::time::sleep(self.receipt_poll_interval).await;
                    }
                }
            }
        }
        Err(VaultError::NetworkTimeout(format!(
            "no receipt for {tx_hash} after {} attempts",
            self.receipt_max_attempts
        )))
    }

    async fn submit_gasless(
        &self,
        provider: &Arc<dyn WalletProvider>,
        owner: Address,
        vault: &VaultMarketInfo,
        plan: &CallPlan,
    ) -> Result<String, VaultError> {
        let session = self
            .gasless_session(provider, &vault.network, vault.chain_id, owner)
            .await?;
        self.validator.ensure(provider.as_ref(), vault.chain_id).await?;
        let tx_hash = self
            .gasless
            .submit_batch(provider.as_ref(), &session, plan)
            .await?;
        info!(chain_id = vault.chain_id, calls = plan.len(), %tx_hash, "gasless batch submitted");
        Ok(tx_hash)
    }

    /// Ready gasless session for (network, chain, owner), initialized at
    /// most once even under concurrent callers.
    pub async fn gasless_session(
        &self,
        provider: &Arc<dyn WalletProvider>,
        network: &str,
        chain_id: u64,
        owner: Address,
    ) -> Result<Arc<GaslessSession>, VaultError> {
        let provider = provider.clone();
        let gasless = self.gasless.clone();
        self.sessions
            .get_or_init(SessionKey::new(network, chain_id, owner), move || async move {
                gasless.init_session(provider.as_ref(), chain_id, owner).await
            })
            .await
    }

    pub fn sessions(&self) -> &AdapterSessionGuard<GaslessSession> {
        &self.sessions
    }

    /// Forget initialized sessions, e.g. after the active account changes.
    pub fn reset_sessions(&self) {
        self.sessions.reset_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::guard::GuardState;
    use crate::mock::MockWalletProvider;
    use crate::provider::methods;
    use crate::types::{Call, ProtocolDetails};
    use alloy::primitives::Bytes;
    use serde_json::Value;

    fn vault() -> VaultMarketInfo {
        VaultMarketInfo {
            asset_address: Address::repeat_byte(0x10),
            market_address: Address::repeat_byte(0x20),
            chain_id: 8453,
            network: "base".into(),
            decimals: 6,
            symbol: "USDC".into(),
            details: ProtocolDetails::Morpho,
        }
    }

    fn plan(n: u8) -> CallPlan {
        let mut plan = CallPlan::new();
        for i in 0..n {
            plan.push(Call::new(Address::repeat_byte(i + 1), Bytes::from(vec![i; 4])));
        }
        plan
    }

    fn executor(config: RuntimeConfig) -> TransactionExecutor {
        TransactionExecutor::new(&config).unwrap()
    }

    fn owner() -> Address {
        Address::repeat_byte(0x11)
    }

    #[tokio::test]
    async fn test_direct_sends_in_order_with_validation_per_call() {
        let mock = Arc::new(MockWalletProvider::new(8453));
        let provider: Arc<dyn WalletProvider> = mock.clone();
        let hash = executor(RuntimeConfig::default())
            .submit(&provider, owner(), &vault(), &plan(2), ExecutionMode::Direct)
            .await
            .unwrap();
        assert_eq!(hash, format!("0x{:064x}", 2));

        let methods_seen: Vec<String> = mock.requests().into_iter().map(|r| r.method).collect();
        assert_eq!(
            methods_seen,
            vec![
                methods::CHAIN_ID,
                methods::SEND_TRANSACTION,
                methods::GET_RECEIPT,
                methods::CHAIN_ID,
                methods::SEND_TRANSACTION,
                methods::GET_RECEIPT,
            ]
        );
        let sent = mock.sent_transactions();
        assert_eq!(sent[0]["to"], Value::from(format!("{:#x}", Address::repeat_byte(1))));
        assert_eq!(sent[1]["to"], Value::from(format!("{:#x}", Address::repeat_byte(2))));
    }

    #[tokio::test]
    async fn test_wrong_network_sends_nothing() {
        let mock = Arc::new(MockWalletProvider::new(1));
        let provider: Arc<dyn WalletProvider> = mock.clone();
        let err = executor(RuntimeConfig::default())
            .submit(&provider, owner(), &vault(), &plan(2), ExecutionMode::Direct)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkMismatch);
        assert_eq!(mock.mutating_requests(), 0);
    }

    #[tokio::test]
    async fn test_reverted_approval_stops_plan() {
        let mock = Arc::new(MockWalletProvider::new(8453));
        mock.push_response(methods::GET_RECEIPT, Ok(serde_json::json!({ "status": "0x0" })));
        let provider: Arc<dyn WalletProvider> = mock.clone();
        let err = executor(RuntimeConfig::default())
            .submit(&provider, owner(), &vault(), &plan(2), ExecutionMode::Direct)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionReverted);
        assert_eq!(mock.count(methods::SEND_TRANSACTION), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_polling_gives_up() {
        let mock = Arc::new(MockWalletProvider::new(8453));
        for _ in 0..3 {
            mock.push_response(methods::GET_RECEIPT, Ok(Value::Null));
        }
        let provider: Arc<dyn WalletProvider> = mock.clone();
        let config = RuntimeConfig {
            receipt_max_attempts: 3,
            ..RuntimeConfig::default()
        };
        let err = executor(config)
            .submit(&provider, owner(), &vault(), &plan(1), ExecutionMode::Direct)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkTimeout);
        assert_eq!(mock.count(methods::GET_RECEIPT), 3);
    }

    #[tokio::test]
    async fn test_gasless_without_config_fails_before_signing() {
        let mock = Arc::new(MockWalletProvider::new(8453));
        let provider: Arc<dyn WalletProvider> = mock.clone();
        let exec = executor(RuntimeConfig::default());
        let err = exec
            .submit(&provider, owner(), &vault(), &plan(2), ExecutionMode::Gasless)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GaslessConfigMissing);
        assert_eq!(mock.total_requests(), 0);
        assert_eq!(
            exec.sessions().state(&SessionKey::new("base", 8453, owner())),
            GuardState::Idle
        );
    }

    #[tokio::test]
    async fn test_route_all_via_gasless_overrides_direct() {
        let mock = Arc::new(MockWalletProvider::new(8453));
        let provider: Arc<dyn WalletProvider> = mock.clone();
        let config = RuntimeConfig {
            route_all_via_gasless: true,
            ..RuntimeConfig::default()
        };
        let err = executor(config)
            .submit(&provider, owner(), &vault(), &plan(1), ExecutionMode::Direct)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GaslessConfigMissing);
        assert_eq!(mock.count(methods::SEND_TRANSACTION), 0);
    }
}
