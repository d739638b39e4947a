//! Signing-session provider contract.
//!
//! The wallet SDK is an opaque collaborator reached through a single
//! EIP-1193 style `request(method, params)` call. Typed helpers on top of it
//! cover the handful of methods this crate issues.

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{ProviderError, VaultError};
use crate::types::Call;

pub mod methods {
    pub const CHAIN_ID: &str = "eth_chainId";
    pub const CALL: &str = "eth_call";
    pub const GET_CODE: &str = "eth_getCode";
    pub const SEND_TRANSACTION: &str = "eth_sendTransaction";
    pub const GET_RECEIPT: &str = "eth_getTransactionReceipt";
    pub const PERSONAL_SIGN: &str = "personal_sign";
    pub const SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
}

/// Methods that change chain or wallet state.
pub fn is_mutating(method: &str) -> bool {
    matches!(
        method,
        methods::SEND_TRANSACTION | methods::PERSONAL_SIGN | methods::SWITCH_CHAIN
    )
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
}

/// Parse a chain id reported either as `0x`-hex or decimal.
pub fn parse_chain_id(value: &Value) -> Result<u64, VaultError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| VaultError::Unknown(format!("invalid chain id {n}"))),
        Value::String(s) => parse_quantity_u64(s),
        other => Err(VaultError::Unknown(format!("invalid chain id {other}"))),
    }
}

fn parse_quantity_u64(s: &str) -> Result<u64, VaultError> {
    let trimmed = s.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex_digits) => u64::from_str_radix(hex_digits, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|e| VaultError::Unknown(format!("invalid quantity '{s}': {e}")))
}

/// Parse a quantity string (hex or decimal) into a U256.
pub fn parse_quantity(s: &str) -> Result<U256, VaultError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(U256::ZERO);
    }
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some("") => Ok(U256::ZERO),
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16),
        None => U256::from_str_radix(trimmed, 10),
    };
    parsed.map_err(|e| VaultError::Unknown(format!("invalid quantity '{s}': {e}")))
}

pub fn to_quantity(v: U256) -> String {
    format!("0x{v:x}")
}

/// Current chain id of the signing session.
pub async fn chain_id(provider: &dyn WalletProvider) -> Result<u64, VaultError> {
    let value = provider.request(methods::CHAIN_ID, json!([])).await?;
    parse_chain_id(&value)
}

/// Read-only call at the latest block.
pub async fn eth_call(
    provider: &dyn WalletProvider,
    to: Address,
    data: &Bytes,
) -> Result<Bytes, VaultError> {
    let value = provider
        .request(
            methods::CALL,
            json!([{ "to": to, "data": data }, "latest"]),
        )
        .await?;
    let hex_str = value
        .as_str()
        .ok_or_else(|| VaultError::Unknown(format!("eth_call returned {value}")))?;
    decode_hex(hex_str)
}

/// First 32-byte word of a call result as a uint256.
pub fn decode_uint(data: &Bytes) -> Result<U256, VaultError> {
    if data.len() < 32 {
        return Err(VaultError::Unknown(format!(
            "expected a uint256 word, got {} bytes",
            data.len()
        )));
    }
    Ok(U256::from_be_slice(&data[..32]))
}

pub async fn get_code(provider: &dyn WalletProvider, account: Address) -> Result<Bytes, VaultError> {
    let value = provider
        .request(methods::GET_CODE, json!([account, "latest"]))
        .await?;
    let hex_str = value.as_str().unwrap_or("0x");
    decode_hex(hex_str)
}

/// Submit one call from `from`; returns the transaction hash.
pub async fn send_transaction(
    provider: &dyn WalletProvider,
    from: Address,
    call: &Call,
) -> Result<String, VaultError> {
    let params = json!([{
        "from": from,
        "to": call.to,
        "data": call.data,
        "value": to_quantity(call.value),
    }]);
    let value = provider.request(methods::SEND_TRANSACTION, params).await?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| VaultError::Unknown(format!("eth_sendTransaction returned {value}")))
}

/// Receipt status for a transaction, `None` while pending.
pub async fn receipt_status(
    provider: &dyn WalletProvider,
    tx_hash: &str,
) -> Result<Option<bool>, VaultError> {
    let value = provider
        .request(methods::GET_RECEIPT, json!([tx_hash]))
        .await?;
    if value.is_null() {
        return Ok(None);
    }
    let status = value
        .get("status")
        .and_then(Value::as_str)
        .map(parse_quantity)
        .transpose()?;
    Ok(Some(status.is_none_or(|s| s == U256::from(1u8))))
}

/// `personal_sign` over raw bytes; returns the hex signature.
pub async fn personal_sign(
    provider: &dyn WalletProvider,
    signer: Address,
    message: &[u8],
) -> Result<String, VaultError> {
    let value = provider
        .request(
            methods::PERSONAL_SIGN,
            json!([format!("0x{}", hex::encode(message)), signer]),
        )
        .await?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| VaultError::Unknown(format!("personal_sign returned {value}")))
}

pub async fn switch_chain(provider: &dyn WalletProvider, chain_id: u64) -> Result<(), VaultError> {
    provider
        .request(
            methods::SWITCH_CHAIN,
            json!([{ "chainId": format!("{chain_id:#x}") }]),
        )
        .await?;
    Ok(())
}

fn decode_hex(s: &str) -> Result<Bytes, VaultError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped)
        .map(Bytes::from)
        .map_err(|e| VaultError::Unknown(format!("invalid hex '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chain_id_hex_and_decimal() {
        assert_eq!(parse_chain_id(&json!("0x2105")).unwrap(), 8453);
        assert_eq!(parse_chain_id(&json!("8453")).unwrap(), 8453);
        assert_eq!(parse_chain_id(&json!(8453)).unwrap(), 8453);
        assert!(parse_chain_id(&json!(null)).is_err());
        assert!(parse_chain_id(&json!("0xzz")).is_err());
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), U256::ZERO);
        assert_eq!(parse_quantity("0x").unwrap(), U256::ZERO);
        assert_eq!(parse_quantity("1000").unwrap(), U256::from(1000u64));
        assert_eq!(parse_quantity("0x3e8").unwrap(), U256::from(1000u64));
        assert_eq!(to_quantity(U256::from(1000u64)), "0x3e8");
        assert_eq!(to_quantity(U256::ZERO), "0x0");
    }

    #[test]
    fn test_decode_uint() {
        let mut word = vec![0u8; 32];
        word[31] = 7;
        assert_eq!(decode_uint(&Bytes::from(word)).unwrap(), U256::from(7u64));
        assert!(decode_uint(&Bytes::from(vec![1u8; 4])).is_err());
    }

    #[test]
    fn test_mutating_methods() {
        assert!(is_mutating(methods::SEND_TRANSACTION));
        assert!(is_mutating(methods::PERSONAL_SIGN));
        assert!(!is_mutating(methods::CHAIN_ID));
        assert!(!is_mutating(methods::CALL));
    }
}
