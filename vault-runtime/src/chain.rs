//! Local-key wallet provider.
//!
//! Serves the provider contract from an alloy HTTP provider with a local
//! signer, for running the runtime without an embedded-wallet SDK.

use alloy::network::{Ethereum, EthereumWallet, ReceiptResponse};
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::providers::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy::providers::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::Signer;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{ProviderError, VaultError};
use crate::provider::{WalletProvider, methods, parse_chain_id, parse_quantity, to_quantity};

/// The concrete provider type produced by `ProviderBuilder::new().wallet(...).connect_http(...)`.
pub type HttpProvider = FillProvider<
    JoinFill<
        JoinFill<
            Identity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider<Ethereum>,
    Ethereum,
>;

/// EIP-1193 code for an unsupported chain switch.
const UNRECOGNIZED_CHAIN: i64 = 4902;
/// EIP-1193 code for an unsupported method.
const UNSUPPORTED_METHOD: i64 = 4200;
const INVALID_PARAMS: i64 = -32602;

pub struct LocalWalletProvider {
    provider: HttpProvider,
    signer: PrivateKeySigner,
    chain_id: u64,
}

impl LocalWalletProvider {
    /// Build from an RPC URL and hex-encoded private key (with or without "0x").
    pub fn new(rpc_url: &str, private_key: &str, chain_id: u64) -> Result<Self, VaultError> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| VaultError::ConfigError(format!("Invalid private key: {e}")))?;
        let signer = signer.with_chain_id(Some(chain_id));

        let wallet = EthereumWallet::from(signer.clone());

        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| VaultError::ConfigError(format!("Invalid RPC URL: {e}")))?;

        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);

        Ok(Self {
            provider,
            signer,
            chain_id,
        })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn dispatch(&self, method: &str, params: &Value) -> Result<Value, ProviderError> {
        match method {
            methods::CHAIN_ID => {
                let id = self.provider.get_chain_id().await.map_err(rpc_error)?;
                Ok(json!(format!("{id:#x}")))
            }
            methods::CALL => {
                let tx = tx_request(&params[0])?;
                let out = self.provider.call(tx).await.map_err(rpc_error)?;
                Ok(json!(out))
            }
            methods::GET_CODE => {
                let account = param_address(&params[0])?;
                let code = self.provider.get_code_at(account).await.map_err(rpc_error)?;
                Ok(json!(code))
            }
            methods::SEND_TRANSACTION => {
                let from = param_address(&params[0]["from"])?;
                if from != self.address() {
                    return Err(ProviderError::new(
                        Some(INVALID_PARAMS),
                        format!("cannot sign for {from}"),
                    ));
                }
                let tx = tx_request(&params[0])?;
                let pending = self.provider.send_transaction(tx).await.map_err(rpc_error)?;
                let hash = *pending.tx_hash();
                debug!(tx_hash = %hash, "transaction sent");
                Ok(json!(hash))
            }
            methods::GET_RECEIPT => {
                let hash: B256 = params[0]
                    .as_str()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| invalid_params("transaction hash"))?;
                let receipt = self
                    .provider
                    .get_transaction_receipt(hash)
                    .await
                    .map_err(rpc_error)?;
                Ok(match receipt {
                    None => Value::Null,
                    Some(r) => json!({
                        "transactionHash": hash,
                        "status": if r.status() { "0x1" } else { "0x0" },
                        "blockNumber": r.block_number().map(|n| to_quantity(U256::from(n))),
                    }),
                })
            }
            methods::PERSONAL_SIGN => {
                let message: Bytes = params[0]
                    .as_str()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| invalid_params("message"))?;
                let signer = param_address(&params[1])?;
                if signer != self.address() {
                    return Err(ProviderError::new(
                        Some(INVALID_PARAMS),
                        format!("cannot sign for {signer}"),
                    ));
                }
                let sig = self
                    .signer
                    .sign_message(&message)
                    .await
                    .map_err(|e| ProviderError::new(None, e.to_string()))?;
                Ok(json!(format!("0x{}", hex::encode(sig.as_bytes()))))
            }
            methods::SWITCH_CHAIN => {
                let requested = parse_chain_id(&params[0]["chainId"])
                    .map_err(|e| ProviderError::new(Some(INVALID_PARAMS), e.to_string()))?;
                if requested == self.chain_id {
                    Ok(Value::Null)
                } else {
                    Err(ProviderError::new(
                        Some(UNRECOGNIZED_CHAIN),
                        format!("local signer is bound to chain {}", self.chain_id),
                    ))
                }
            }
            other => Err(ProviderError::new(
                Some(UNSUPPORTED_METHOD),
                format!("method {other} not supported"),
            )),
        }
    }
}

#[async_trait]
impl WalletProvider for LocalWalletProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.dispatch(method, &params).await
    }
}

fn rpc_error(e: RpcError<TransportErrorKind>) -> ProviderError {
    match e.as_error_resp() {
        Some(payload) => ProviderError::new(Some(payload.code), payload.message.to_string()),
        None => ProviderError::new(None, e.to_string()),
    }
}

fn invalid_params(what: &str) -> ProviderError {
    ProviderError::new(Some(INVALID_PARAMS), format!("missing or invalid {what}"))
}

fn param_address(value: &Value) -> Result<Address, ProviderError> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid_params("address"))
}

fn tx_request(obj: &Value) -> Result<TransactionRequest, ProviderError> {
    let to = param_address(&obj["to"])?;
    let data: Bytes = match obj["data"].as_str() {
        Some(s) => s.parse().map_err(|_| invalid_params("data"))?,
        None => Bytes::new(),
    };
    let mut tx = TransactionRequest::default().to(to).input(data.into());
    if let Some(from) = obj["from"].as_str() {
        tx = tx.from(from.parse().map_err(|_| invalid_params("from"))?);
    }
    if let Some(v) = obj["value"].as_str() {
        let value = parse_quantity(v).map_err(|_| invalid_params("value"))?;
        tx = tx.value(value);
    }
    Ok(tx)
}
