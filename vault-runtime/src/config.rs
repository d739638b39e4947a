//! Runtime configuration, read from `VAULT_*` environment variables.

use std::time::Duration;

use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::VaultError;

pub const DEFAULT_PENDLE_API_BASE: &str = "https://api-v2.pendle.finance";

/// Allowance granted when an approval is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// Approve `U256::MAX` so later operations skip the approval prompt.
    #[default]
    Max,
    /// Approve exactly the amount the pending operation needs.
    Exact,
}

impl std::str::FromStr for ApprovalPolicy {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max" => Ok(ApprovalPolicy::Max),
            "exact" => Ok(ApprovalPolicy::Exact),
            other => Err(VaultError::ConfigError(format!(
                "unknown approval policy '{other}'"
            ))),
        }
    }
}

/// Sponsor credentials for the gasless relay. All four must be set before
/// a batch can be submitted; blanks mark missing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaslessConfig {
    pub relay_url: String,
    pub sponsor_api_key: String,
    pub policy_id: String,
    /// Batch-executor implementation the account delegates to.
    pub implementation_address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub pendle_api_base: String,
    pub quote_timeout: Duration,
    pub slippage: Decimal,
    pub pendle_min_amount: Decimal,
    pub approval_policy: ApprovalPolicy,
    pub auto_switch_network: bool,
    pub route_all_via_gasless: bool,
    pub balance_ttl: Duration,
    pub quote_ttl: Duration,
    pub debounce_window: Duration,
    pub receipt_poll_interval: Duration,
    pub receipt_max_attempts: u32,
    pub gasless: Option<GaslessConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pendle_api_base: DEFAULT_PENDLE_API_BASE.to_string(),
            quote_timeout: Duration::from_secs(10),
            slippage: Decimal::new(1, 2),
            pendle_min_amount: Decimal::new(1, 2),
            approval_policy: ApprovalPolicy::Max,
            auto_switch_network: false,
            route_all_via_gasless: false,
            balance_ttl: Duration::from_secs(30),
            quote_ttl: Duration::from_secs(15),
            debounce_window: Duration::from_millis(500),
            receipt_poll_interval: Duration::from_secs(2),
            receipt_max_attempts: 60,
            gasless: None,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by any `VAULT_*` variable that is set.
    pub fn from_env() -> Result<Self, VaultError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, VaultError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("VAULT_PENDLE_API_BASE") {
            cfg.pendle_api_base = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("VAULT_QUOTE_TIMEOUT_MS") {
            cfg.quote_timeout = Duration::from_millis(parse("VAULT_QUOTE_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = get("VAULT_SLIPPAGE") {
            cfg.slippage = parse("VAULT_SLIPPAGE", &v)?;
        }
        if let Some(v) = get("VAULT_PENDLE_MIN_AMOUNT") {
            cfg.pendle_min_amount = parse("VAULT_PENDLE_MIN_AMOUNT", &v)?;
        }
        if let Some(v) = get("VAULT_APPROVAL_POLICY") {
            cfg.approval_policy = v.parse()?;
        }
        if let Some(v) = get("VAULT_AUTO_SWITCH_NETWORK") {
            cfg.auto_switch_network = parse_bool("VAULT_AUTO_SWITCH_NETWORK", &v)?;
        }
        if let Some(v) = get("VAULT_ROUTE_ALL_VIA_GASLESS") {
            cfg.route_all_via_gasless = parse_bool("VAULT_ROUTE_ALL_VIA_GASLESS", &v)?;
        }
        if let Some(v) = get("VAULT_BALANCE_TTL_MS") {
            cfg.balance_ttl = Duration::from_millis(parse("VAULT_BALANCE_TTL_MS", &v)?);
        }
        if let Some(v) = get("VAULT_QUOTE_TTL_MS") {
            cfg.quote_ttl = Duration::from_millis(parse("VAULT_QUOTE_TTL_MS", &v)?);
        }
        if let Some(v) = get("VAULT_DEBOUNCE_MS") {
            cfg.debounce_window = Duration::from_millis(parse("VAULT_DEBOUNCE_MS", &v)?);
        }
        if let Some(v) = get("VAULT_RECEIPT_POLL_MS") {
            cfg.receipt_poll_interval = Duration::from_millis(parse("VAULT_RECEIPT_POLL_MS", &v)?);
        }
        if let Some(v) = get("VAULT_RECEIPT_MAX_ATTEMPTS") {
            cfg.receipt_max_attempts = parse("VAULT_RECEIPT_MAX_ATTEMPTS", &v)?;
        }

        let relay_url = get("VAULT_GASLESS_RELAY_URL");
        let sponsor_api_key = get("VAULT_GASLESS_SPONSOR_KEY");
        let policy_id = get("VAULT_GASLESS_POLICY_ID");
        let implementation = get("VAULT_GASLESS_IMPLEMENTATION");
        // Partial gasless settings are kept with blanks; the executor names
        // the missing ones when a gasless protocol is used.
        if relay_url.is_some() || sponsor_api_key.is_some() || policy_id.is_some() || implementation.is_some() {
            let implementation_address = match implementation {
                Some(v) => parse("VAULT_GASLESS_IMPLEMENTATION", &v)?,
                None => Address::ZERO,
            };
            cfg.gasless = Some(GaslessConfig {
                relay_url: relay_url
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_default(),
                sponsor_api_key: sponsor_api_key.unwrap_or_default(),
                policy_id: policy_id.unwrap_or_default(),
                implementation_address,
            });
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), VaultError> {
        if self.slippage < Decimal::ZERO || self.slippage >= Decimal::ONE {
            return Err(VaultError::ConfigError(format!(
                "slippage {} must be in [0, 1)",
                self.slippage
            )));
        }
        if self.pendle_min_amount < Decimal::ZERO {
            return Err(VaultError::ConfigError(
                "pendle minimum must not be negative".into(),
            ));
        }
        if self.receipt_max_attempts == 0 {
            return Err(VaultError::ConfigError(
                "receipt_max_attempts must be at least 1".into(),
            ));
        }
        url::Url::parse(&self.pendle_api_base).map_err(|e| {
            VaultError::ConfigError(format!("invalid pendle api base '{}': {e}", self.pendle_api_base))
        })?;
        if let Some(g) = &self.gasless
            && !g.relay_url.is_empty()
        {
            url::Url::parse(&g.relay_url).map_err(|e| {
                VaultError::ConfigError(format!("invalid relay url '{}': {e}", g.relay_url))
            })?;
        }
        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, VaultError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| VaultError::ConfigError(format!("{key}='{value}': {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, VaultError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(VaultError::ConfigError(format!(
            "{key}='{value}' is not a boolean"
        ))),
    }
}
