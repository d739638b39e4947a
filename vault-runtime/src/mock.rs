//! In-memory collaborators for tests: a scripted wallet provider that
//! records every request, and a fixed identity provider.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{ProviderError, VaultError};
use crate::provider::{WalletProvider, is_mutating, methods, parse_chain_id};
use crate::types::ChainType;
use crate::wallet::IdentityProvider;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub params: Value,
}

#[derive(Default)]
struct MockState {
    chain_id: u64,
    requests: Vec<RecordedRequest>,
    scripted: HashMap<String, VecDeque<Result<Value, ProviderError>>>,
    call_results: HashMap<(Address, [u8; 4]), U256>,
    code: HashMap<Address, String>,
    tx_counter: u64,
}

/// Scripted provider. Unscripted methods get sensible defaults: the
/// configured chain id, zero words for `eth_call`, successful receipts.
pub struct MockWalletProvider {
    state: Mutex<MockState>,
}

impl MockWalletProvider {
    pub fn new(chain_id: u64) -> Self {
        Self {
            state: Mutex::new(MockState {
                chain_id,
                ..MockState::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Return `value` for `eth_call` to `to` with the given selector.
    pub fn set_call_result(&self, to: Address, selector: [u8; 4], value: U256) {
        self.lock().call_results.insert((to, selector), value);
    }

    pub fn set_code(&self, account: Address, code: impl Into<String>) {
        self.lock().code.insert(account, code.into());
    }

    /// Queue a one-shot response for `method`, consumed before defaults.
    pub fn push_response(&self, method: &str, response: Result<Value, ProviderError>) {
        self.lock()
            .scripted
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn fail_next(&self, method: &str, code: Option<i64>, message: &str) {
        self.push_response(method, Err(ProviderError::new(code, message)));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn mutating_requests(&self) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| is_mutating(&r.method))
            .count()
    }

    /// Params object of each `eth_sendTransaction`, in order.
    pub fn sent_transactions(&self) -> Vec<Value> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == methods::SEND_TRANSACTION)
            .map(|r| r.params[0].clone())
            .collect()
    }

    fn default_response(state: &mut MockState, method: &str, params: &Value) -> Result<Value, ProviderError> {
        match method {
            methods::CHAIN_ID => Ok(json!(format!("{:#x}", state.chain_id))),
            methods::CALL => {
                let to = params[0]["to"]
                    .as_str()
                    .and_then(|s| s.parse::<Address>().ok())
                    .unwrap_or_default();
                let data = params[0]["data"].as_str().unwrap_or("0x");
                let raw = hex::decode(data.trim_start_matches("0x")).unwrap_or_default();
                let mut selector = [0u8; 4];
                if raw.len() >= 4 {
                    selector.copy_from_slice(&raw[..4]);
                }
                let word = state
                    .call_results
                    .get(&(to, selector))
                    .copied()
                    .unwrap_or(U256::ZERO);
                Ok(json!(format!("0x{}", hex::encode(word.to_be_bytes::<32>()))))
            }
            methods::GET_CODE => {
                let account = params[0]
                    .as_str()
                    .and_then(|s| s.parse::<Address>().ok())
                    .unwrap_or_default();
                Ok(json!(state.code.get(&account).cloned().unwrap_or_else(|| "0x".into())))
            }
            methods::SEND_TRANSACTION => {
                state.tx_counter += 1;
                Ok(json!(format!("0x{:064x}", state.tx_counter)))
            }
            methods::GET_RECEIPT => Ok(json!({ "status": "0x1" })),
            methods::PERSONAL_SIGN => Ok(json!(format!("0x{}", "11".repeat(65)))),
            methods::SWITCH_CHAIN => {
                let requested = parse_chain_id(&params[0]["chainId"])
                    .map_err(|e| ProviderError::new(Some(4902), e.to_string()))?;
                state.chain_id = requested;
                Ok(Value::Null)
            }
            other => Err(ProviderError::new(
                Some(4200),
                format!("unsupported method {other}"),
            )),
        }
    }
}

#[async_trait]
impl WalletProvider for MockWalletProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            method: method.to_string(),
            params: params.clone(),
        });
        if let Some(next) = state
            .scripted
            .get_mut(method)
            .and_then(VecDeque::pop_front)
        {
            return next;
        }
        Self::default_response(&mut state, method, &params)
    }
}

/// Identity provider with fixed addresses; created wallets get a
/// deterministic placeholder address.
pub struct StaticIdentityProvider {
    addresses: Mutex<HashMap<ChainType, String>>,
    provider: Arc<dyn WalletProvider>,
    creates: AtomicUsize,
    create_delay: Duration,
}

impl StaticIdentityProvider {
    pub fn new(
        ethereum: Option<&str>,
        solana: Option<&str>,
        provider: Arc<dyn WalletProvider>,
    ) -> Self {
        let mut addresses = HashMap::new();
        if let Some(a) = ethereum {
            addresses.insert(ChainType::Ethereum, a.to_string());
        }
        if let Some(a) = solana {
            addresses.insert(ChainType::Solana, a.to_string());
        }
        Self {
            addresses: Mutex::new(addresses),
            provider,
            creates: AtomicUsize::new(0),
            create_delay: Duration::ZERO,
        }
    }

    /// Make `create_wallet` take `delay` before answering.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve_address(&self, chain_type: ChainType) -> Result<Option<String>, VaultError> {
        Ok(self
            .addresses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&chain_type)
            .cloned())
    }

    async fn create_wallet(&self, chain_type: ChainType) -> Result<String, VaultError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        let address = match chain_type {
            ChainType::Ethereum => format!("0x{n:040x}"),
            ChainType::Solana => format!("So1ana{n:038}"),
        };
        self.addresses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(chain_type, address.clone());
        Ok(address)
    }

    fn ethereum_provider(&self) -> Arc<dyn WalletProvider> {
        self.provider.clone()
    }
}

