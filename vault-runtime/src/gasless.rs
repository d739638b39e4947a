//! Sponsored batch submission.
//!
//! A call plan is wrapped into one `executeBatch` call on the account's
//! delegated implementation, signed once with `personal_sign`, and handed
//! to the sponsor relay. The relay either accepts the whole batch or the
//! submission fails; nothing is sent on-chain from this side.

use std::time::Duration;

use alloy::primitives::{Address, B256, Bytes, U256, keccak256};
use alloy::sol_types::{SolCall, SolValue};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::GaslessConfig;
use crate::contracts::IBatchExecutor;
use crate::error::VaultError;
use crate::provider::{self, WalletProvider, to_quantity};
use crate::types::CallPlan;

/// EIP-7702 delegation designator prefix found in a delegated account's code.
const DELEGATION_PREFIX: [u8; 3] = [0xef, 0x01, 0x00];

/// Per-(network, chain, account) state learned once at session initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GaslessSession {
    pub chain_id: u64,
    pub account: Address,
    /// Account code already points at the batch implementation.
    pub delegated: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayCall {
    to: Address,
    data: Bytes,
    value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest<'a> {
    chain_id: u64,
    account: Address,
    implementation: Address,
    policy_id: &'a str,
    delegated: bool,
    calls: Vec<RelayCall>,
    call_data: Bytes,
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayResponse {
    tx_hash: String,
}

pub struct GaslessBatchExecutor {
    config: Option<GaslessConfig>,
    client: reqwest::Client,
}

impl GaslessBatchExecutor {
    pub fn new(config: Option<GaslessConfig>, timeout: Duration) -> Result<Self, VaultError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VaultError::ConfigError(format!("relay http client: {e}")))?;
        Ok(Self { config, client })
    }

    fn config(&self) -> Result<&GaslessConfig, VaultError> {
        let cfg = self
            .config
            .as_ref()
            .ok_or_else(|| VaultError::GaslessConfigMissing("no sponsor configuration".into()))?;
        let mut missing = Vec::new();
        if cfg.relay_url.trim().is_empty() {
            missing.push("relay_url");
        }
        if cfg.sponsor_api_key.trim().is_empty() {
            missing.push("sponsor_api_key");
        }
        if cfg.policy_id.trim().is_empty() {
            missing.push("policy_id");
        }
        if cfg.implementation_address.is_zero() {
            missing.push("implementation_address");
        }
        if !missing.is_empty() {
            return Err(VaultError::GaslessConfigMissing(missing.join(", ")));
        }
        Ok(cfg)
    }

    /// Read the account code once to learn whether it already delegates
    /// to the batch implementation.
    pub async fn init_session(
        &self,
        provider: &dyn WalletProvider,
        chain_id: u64,
        account: Address,
    ) -> Result<GaslessSession, VaultError> {
        let cfg = self.config()?;
        let code = provider::get_code(provider, account).await?;
        let delegated = code.len() == 23
            && code[..3] == DELEGATION_PREFIX
            && &code[3..] == cfg.implementation_address.as_slice();
        info!(chain_id, %account, delegated, "gasless session initialized");
        Ok(GaslessSession {
            chain_id,
            account,
            delegated,
        })
    }

    /// `executeBatch` calldata for `plan`, calls in plan order.
    pub fn encode_batch(plan: &CallPlan) -> Bytes {
        let calls = plan
            .calls()
            .iter()
            .map(|c| IBatchExecutor::Call {
                target: c.to,
                value: c.value,
                data: c.data.clone(),
            })
            .collect();
        Bytes::from(IBatchExecutor::executeBatchCall { calls }.abi_encode())
    }

    /// Digest the account signs: `keccak256(abi.encode(chainId, account, keccak256(callData)))`.
    pub fn batch_digest(chain_id: u64, account: Address, call_data: &[u8]) -> B256 {
        let inner = keccak256(call_data);
        keccak256((U256::from(chain_id), account, inner).abi_encode())
    }

    /// Sign once and submit the whole plan to the relay; returns the
    /// relay's transaction hash.
    pub async fn submit_batch(
        &self,
        provider: &dyn WalletProvider,
        session: &GaslessSession,
        plan: &CallPlan,
    ) -> Result<String, VaultError> {
        let cfg = self.config()?;
        if plan.is_empty() {
            return Err(VaultError::GaslessSubmissionFailed("empty batch".into()));
        }

        let call_data = Self::encode_batch(plan);
        let digest = Self::batch_digest(session.chain_id, session.account, &call_data);
        let signature = provider::personal_sign(provider, session.account, digest.as_slice()).await?;

        let body = RelayRequest {
            chain_id: session.chain_id,
            account: session.account,
            implementation: cfg.implementation_address,
            policy_id: &cfg.policy_id,
            delegated: session.delegated,
            calls: plan
                .calls()
                .iter()
                .map(|c| RelayCall {
                    to: c.to,
                    data: c.data.clone(),
                    value: to_quantity(c.value),
                })
                .collect(),
            call_data,
            signature,
        };

        let url = format!("{}/v1/batches", cfg.relay_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&cfg.sponsor_api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VaultError::GaslessSubmissionFailed(format!("relay unreachable: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| VaultError::GaslessSubmissionFailed(format!("relay body: {e}")))?;
        if !status.is_success() {
            warn!(%status, account = %session.account, "relay rejected batch");
            let snippet: String = text.chars().take(200).collect();
            return Err(VaultError::GaslessSubmissionFailed(format!(
                "HTTP {status}: {snippet}"
            )));
        }
        let parsed: RelayResponse = serde_json::from_str(&text)
            .map_err(|e| VaultError::GaslessSubmissionFailed(format!("relay response: {e}")))?;

        info!(
            chain_id = session.chain_id,
            calls = plan.len(),
            tx_hash = %parsed.tx_hash,
            "gasless batch accepted"
        );
        Ok(parsed.tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mock::MockWalletProvider;
    use crate::provider::methods;
    use crate::types::Call;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn implementation() -> Address {
        Address::repeat_byte(0x22)
    }

    fn config(relay_url: String) -> GaslessConfig {
        GaslessConfig {
            relay_url,
            sponsor_api_key: "sponsor-key".into(),
            policy_id: "policy-1".into(),
            implementation_address: implementation(),
        }
    }

    fn plan() -> CallPlan {
        let mut plan = CallPlan::new();
        plan.push(Call::new(Address::repeat_byte(1), vec![0x09, 0x5e, 0xa7, 0xb3]));
        plan.push(Call::new(Address::repeat_byte(2), vec![0xf2, 0xb9, 0xfd, 0xb8]));
        plan
    }

    fn session() -> GaslessSession {
        GaslessSession {
            chain_id: 8453,
            account: Address::repeat_byte(0x11),
            delegated: false,
        }
    }

    #[test]
    fn test_encode_batch_selector() {
        let data = GaslessBatchExecutor::encode_batch(&plan());
        assert_eq!(&data[..4], &[0x34, 0xfc, 0xd5, 0xbe]);
    }

    #[tokio::test]
    async fn test_missing_config_fails_before_signing() {
        let p = MockWalletProvider::new(8453);
        let executor = GaslessBatchExecutor::new(None, Duration::from_secs(1)).unwrap();
        let err = executor.submit_batch(&p, &session(), &plan()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GaslessConfigMissing);
        assert_eq!(p.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_partial_config_names_missing_fields() {
        let mut cfg = config("http://relay".into());
        cfg.policy_id.clear();
        let executor = GaslessBatchExecutor::new(Some(cfg), Duration::from_secs(1)).unwrap();
        match executor.config() {
            Err(VaultError::GaslessConfigMissing(msg)) => assert!(msg.contains("policy_id")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_partial_env_settings_reported_before_any_request() {
        let cfg = crate::config::RuntimeConfig::from_lookup(|key| match key {
            "VAULT_GASLESS_RELAY_URL" => Some("https://relay.example".to_string()),
            "VAULT_GASLESS_SPONSOR_KEY" => Some("key".to_string()),
            _ => None,
        })
        .unwrap();
        let p = MockWalletProvider::new(8453);
        let executor = GaslessBatchExecutor::new(cfg.gasless, Duration::from_secs(1)).unwrap();
        let err = executor
            .init_session(&p, 8453, Address::repeat_byte(0x11))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            VaultError::GaslessConfigMissing("policy_id, implementation_address".into())
        );
        assert_eq!(p.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_submit_batch_single_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/batches"))
            .and(header("authorization", "Bearer sponsor-key"))
            .and(body_partial_json(json!({
                "chainId": 8453,
                "policyId": "policy-1",
                "delegated": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "txHash": "0xfeed" })))
            .expect(1)
            .mount(&server)
            .await;

        let p = MockWalletProvider::new(8453);
        let executor = GaslessBatchExecutor::new(Some(config(server.uri())), Duration::from_secs(2)).unwrap();
        let hash = executor.submit_batch(&p, &session(), &plan()).await.unwrap();
        assert_eq!(hash, "0xfeed");
        assert_eq!(p.count(methods::PERSONAL_SIGN), 1);
        assert_eq!(p.count(methods::SEND_TRANSACTION), 0);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["calls"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_relay_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("paymaster out of funds"))
            .mount(&server)
            .await;
        let p = MockWalletProvider::new(8453);
        let executor = GaslessBatchExecutor::new(Some(config(server.uri())), Duration::from_secs(2)).unwrap();
        let err = executor.submit_batch(&p, &session(), &plan()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GaslessSubmissionFailed);
    }

    #[tokio::test]
    async fn test_rejected_signature_never_reaches_relay() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "txHash": "0x1" })))
            .expect(0)
            .mount(&server)
            .await;
        let p = MockWalletProvider::new(8453);
        p.fail_next(methods::PERSONAL_SIGN, Some(4001), "User rejected the request.");
        let executor = GaslessBatchExecutor::new(Some(config(server.uri())), Duration::from_secs(2)).unwrap();
        let err = executor.submit_batch(&p, &session(), &plan()).await.unwrap_err();
        assert_eq!(err, VaultError::UserRejected);
    }

    #[tokio::test]
    async fn test_init_session_detects_delegation() {
        let p = MockWalletProvider::new(8453);
        let account = Address::repeat_byte(0x11);
        p.set_code(account, format!("0xef0100{}", hex::encode(implementation())));
        let executor = GaslessBatchExecutor::new(Some(config("http://relay".into())), Duration::from_secs(1)).unwrap();
        let s = executor.init_session(&p, 8453, account).await.unwrap();
        assert!(s.delegated);

        let fresh = executor.init_session(&p, 8453, Address::repeat_byte(0x12)).await.unwrap();
        assert!(!fresh.delegated);
    }
}
