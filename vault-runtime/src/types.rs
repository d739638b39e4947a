use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, VaultError};

/// Supported yield protocols.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    Aave,
    Compound,
    Pendle,
    Morpho,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Aave => "aave",
            ProtocolKind::Compound => "compound",
            ProtocolKind::Pendle => "pendle",
            ProtocolKind::Morpho => "morpho",
        }
    }
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol-specific market fields. The variant determines the protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum ProtocolDetails {
    Aave {
        pool_address: Address,
        /// Receipt token, used to read the deposited balance.
        #[serde(default)]
        a_token_address: Option<Address>,
    },
    Compound {
        comet_address: Address,
    },
    Pendle {
        pt_address: Address,
        yt_address: Address,
    },
    /// ERC-4626 vault; the market address is the vault itself.
    Morpho,
}

/// Description of one vault market. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultMarketInfo {
    pub asset_address: Address,
    pub market_address: Address,
    pub chain_id: u64,
    pub network: String,
    pub decimals: u8,
    pub symbol: String,
    #[serde(flatten)]
    pub details: ProtocolDetails,
}

impl VaultMarketInfo {
    pub fn protocol(&self) -> ProtocolKind {
        match self.details {
            ProtocolDetails::Aave { .. } => ProtocolKind::Aave,
            ProtocolDetails::Compound { .. } => ProtocolKind::Compound,
            ProtocolDetails::Pendle { .. } => ProtocolKind::Pendle,
            ProtocolDetails::Morpho => ProtocolKind::Morpho,
        }
    }
}

/// Input to a deposit or withdraw. `amount` is a human decimal string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultOperationParams {
    pub vault: VaultMarketInfo,
    pub amount: String,
    #[serde(default)]
    pub user_address: Option<Address>,
}

/// Outcome returned to UI collaborators. Exactly one of `tx_hash` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultOperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl VaultOperationResult {
    pub fn ok(tx_hash: impl Into<String>) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash.into()),
            error: None,
            message: None,
            diagnostic: None,
        }
    }

    pub fn failed(err: &VaultError) -> Self {
        let kind = err.kind();
        Self {
            success: false,
            tx_hash: None,
            error: Some(kind),
            message: Some(kind.message().to_string()),
            diagnostic: err.diagnostic(),
        }
    }
}

impl From<Result<String, VaultError>> for VaultOperationResult {
    fn from(result: Result<String, VaultError>) -> Self {
        match result {
            Ok(hash) => VaultOperationResult::ok(hash),
            Err(e) => VaultOperationResult::failed(&e),
        }
    }
}

/// A single on-chain call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl Call {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            value: U256::ZERO,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Ordered calls; approvals always precede the action that depends on them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPlan {
    calls: Vec<Call>,
}

impl CallPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, call: Call) {
        self.calls.push(call);
    }

    pub fn extend(&mut self, other: CallPlan) {
        self.calls.extend(other.calls);
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Wallet family held by the session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Ethereum,
    Solana,
}

impl ChainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainType::Ethereum => "ethereum",
            ChainType::Solana => "solana",
        }
    }

    pub fn other(&self) -> ChainType {
        match self {
            ChainType::Ethereum => ChainType::Solana,
            ChainType::Solana => ChainType::Ethereum,
        }
    }
}

impl std::str::FromStr for ChainType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ethereum" => Ok(ChainType::Ethereum),
            "solana" => Ok(ChainType::Solana),
            other => Err(VaultError::WalletUnavailable(format!(
                "unknown wallet type '{other}'"
            ))),
        }
    }
}

/// Direction of a vault operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Deposit,
    Withdraw,
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDC: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
    const POOL: &str = "0xA238Dd80C259a72e81d7e4664a9801593F98d1c5";

    #[test]
    fn test_market_info_deserializes_tagged_details() {
        let json = serde_json::json!({
            "asset_address": USDC,
            "market_address": POOL,
            "chain_id": 8453,
            "network": "base",
            "decimals": 6,
            "symbol": "USDC",
            "protocol": "aave",
            "pool_address": POOL
        });
        let info: VaultMarketInfo = serde_json::from_value(json).unwrap();
        assert_eq!(info.protocol(), ProtocolKind::Aave);
        assert!(matches!(
            info.details,
            ProtocolDetails::Aave { a_token_address: None, .. }
        ));
    }

    #[test]
    fn test_morpho_details_without_fields() {
        let json = serde_json::json!({
            "asset_address": USDC,
            "market_address": POOL,
            "chain_id": 1,
            "network": "ethereum",
            "decimals": 6,
            "symbol": "USDC",
            "protocol": "morpho"
        });
        let info: VaultMarketInfo = serde_json::from_value(json).unwrap();
        assert_eq!(info.protocol(), ProtocolKind::Morpho);
    }

    #[test]
    fn test_result_exactly_one_of_hash_or_error() {
        let ok = VaultOperationResult::ok("0xabc");
        assert!(ok.success && ok.tx_hash.is_some() && ok.error.is_none());

        let failed = VaultOperationResult::failed(&VaultError::UserRejected);
        assert!(!failed.success && failed.tx_hash.is_none());
        assert_eq!(failed.error, Some(ErrorKind::UserRejected));
        assert!(failed.diagnostic.is_none());
    }

    #[test]
    fn test_chain_type_parse() {
        assert_eq!("Ethereum".parse::<ChainType>().unwrap(), ChainType::Ethereum);
        assert_eq!("solana".parse::<ChainType>().unwrap(), ChainType::Solana);
        assert!("bitcoin".parse::<ChainType>().is_err());
    }

    #[test]
    fn test_call_plan_preserves_order() {
        let a: Address = USDC.parse().unwrap();
        let b: Address = POOL.parse().unwrap();
        let mut plan = CallPlan::new();
        plan.push(Call::new(a, vec![1u8]));
        plan.push(Call::new(b, vec![2u8]));
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.calls()[0].to, a);
        assert_eq!(plan.calls()[1].to, b);
    }
}
