//! Decimal ⇄ base-unit conversion for on-chain token amounts.
//!
//! Amounts arrive as human decimal strings and are converted with integer
//! arithmetic only, so values beyond `rust_decimal`'s 28-digit range still
//! convert exactly.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::VaultError;

/// Highest token precision accepted.
pub const MAX_DECIMALS: u8 = 77;

/// Literal accepted on withdraw to mean "everything deposited".
pub const WITHDRAW_ALL: &str = "all";

/// Parsed withdraw/deposit amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountSpec {
    Exact(U256),
    /// Maps to the protocol's max-uint sentinel (or full balance).
    All,
}

impl AmountSpec {
    /// Exact amount, or `U256::MAX` for `All`.
    pub fn to_wei(&self) -> U256 {
        match self {
            AmountSpec::Exact(v) => *v,
            AmountSpec::All => U256::MAX,
        }
    }
}

/// Convert a human decimal string to base units, truncating extra
/// fractional digits toward zero.
pub fn to_base_units(amount: &str, decimals: u8) -> Result<U256, VaultError> {
    if decimals > MAX_DECIMALS {
        return Err(VaultError::InvalidAmount(format!(
            "unsupported precision {decimals}"
        )));
    }
    let trimmed = amount.trim();
    if trimmed.starts_with('-') {
        return Err(VaultError::InvalidAmount(format!(
            "negative amount '{trimmed}'"
        )));
    }

    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty())
        || !all_digits(int_part)
        || !all_digits(frac_part)
    {
        return Err(VaultError::InvalidAmount(format!(
            "'{trimmed}' is not a decimal number"
        )));
    }

    let scale = decimals as usize;
    let mut digits = String::with_capacity(int_part.len() + scale);
    digits.push_str(int_part);
    if frac_part.len() >= scale {
        digits.push_str(&frac_part[..scale]);
    } else {
        digits.push_str(frac_part);
        digits.extend(std::iter::repeat_n('0', scale - frac_part.len()));
    }

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10)
        .map_err(|e| VaultError::InvalidAmount(format!("'{trimmed}' out of range: {e}")))
}

/// Convert base units back to a decimal string with all `decimals`
/// fractional digits retained, trailing zeros trimmed.
pub fn from_base_units(value: U256, decimals: u8) -> String {
    let raw = value.to_string();
    let scale = decimals as usize;
    if scale == 0 {
        return raw;
    }

    let padded = if raw.len() <= scale {
        format!("{}{raw}", "0".repeat(scale - raw.len() + 1))
    } else {
        raw
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    }
}

/// Round a base-unit value down to `display_digits` fractional digits for display.
pub fn format_display(value: U256, decimals: u8, display_digits: u8) -> String {
    let full = from_base_units(value, decimals);
    match full.split_once('.') {
        Some((int_part, frac)) if frac.len() > display_digits as usize => {
            let kept = frac[..display_digits as usize].trim_end_matches('0');
            if kept.is_empty() {
                int_part.to_string()
            } else {
                format!("{int_part}.{kept}")
            }
        }
        _ => full,
    }
}

/// Parse an operation amount, accepting `"all"` only where allowed.
pub fn parse_amount(amount: &str, decimals: u8, allow_all: bool) -> Result<AmountSpec, VaultError> {
    if amount.trim().eq_ignore_ascii_case(WITHDRAW_ALL) {
        if allow_all {
            return Ok(AmountSpec::All);
        }
        return Err(VaultError::InvalidAmount(
            "'all' is only valid for withdrawals".into(),
        ));
    }
    let value = to_base_units(amount, decimals)?;
    if value.is_zero() {
        return Err(VaultError::InvalidAmount(format!(
            "'{}' is zero at {decimals} decimals",
            amount.trim()
        )));
    }
    Ok(AmountSpec::Exact(value))
}

/// Base units as a `Decimal` in token units, when it fits.
pub fn to_decimal(value: U256, decimals: u8) -> Option<Decimal> {
    Decimal::from_str(&from_base_units(value, decimals)).ok()
}
