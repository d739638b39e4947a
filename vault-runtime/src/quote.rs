//! Pendle routing API client: swap quotes for deposits, redeem quotes for
//! withdrawals. Both return a ready-to-send transaction plus the token
//! approvals it depends on.

use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::VaultError;
use crate::provider::parse_quantity;
use crate::types::Call;

const SERVICE: &str = "pendle";

/// Approval a quoted transaction needs before it can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenApproval {
    pub token: Address,
    pub spender: Address,
}

/// Executable quote returned by the routing API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendleQuote {
    pub tx: Call,
    pub approvals: Vec<TokenApproval>,
    /// Expected output in base units, when the API reports it.
    pub amount_out: Option<U256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapRequest {
    pub chain_id: u64,
    pub market: Address,
    pub receiver: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeemRequest {
    pub chain_id: u64,
    pub yt: Address,
    pub receiver: Address,
    pub token_out: Address,
    pub amount_in: U256,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    tx: TxResponse,
    #[serde(default)]
    token_approvals: Vec<ApprovalResponse>,
    #[serde(default)]
    data: Option<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    to: Address,
    data: Bytes,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApprovalResponse {
    token: Address,
    #[serde(default)]
    spender: Option<Address>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteData {
    #[serde(default)]
    amount_out: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PendleClient {
    base_url: String,
    slippage: Decimal,
    client: reqwest::Client,
}

impl PendleClient {
    pub fn new(base_url: impl Into<String>, slippage: Decimal, timeout: Duration) -> Result<Self, VaultError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VaultError::ConfigError(format!("pendle http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            slippage,
            client,
        })
    }

    /// Quote swapping `token_in` into the market's PT.
    pub async fn swap_quote(&self, req: &SwapRequest) -> Result<PendleQuote, VaultError> {
        let url = format!(
            "{}/core/v2/sdk/{}/markets/{:#x}/swap",
            self.base_url, req.chain_id, req.market
        );
        let query = [
            ("receiver", format!("{:#x}", req.receiver)),
            ("slippage", self.slippage.to_string()),
            ("tokenIn", format!("{:#x}", req.token_in)),
            ("tokenOut", format!("{:#x}", req.token_out)),
            ("amountIn", req.amount_in.to_string()),
            ("enableAggregator", "true".to_string()),
        ];
        self.fetch(&url, &query).await
    }

    /// Quote redeeming PT (with matching YT) back into `token_out`.
    pub async fn redeem_quote(&self, req: &RedeemRequest) -> Result<PendleQuote, VaultError> {
        let url = format!("{}/core/v2/sdk/{}/redeem", self.base_url, req.chain_id);
        let query = [
            ("receiver", format!("{:#x}", req.receiver)),
            ("slippage", self.slippage.to_string()),
            ("yt", format!("{:#x}", req.yt)),
            ("amountIn", req.amount_in.to_string()),
            ("tokenOut", format!("{:#x}", req.token_out)),
        ];
        self.fetch(&url, &query).await
    }

    async fn fetch(&self, url: &str, query: &[(&str, String)]) -> Result<PendleQuote, VaultError> {
        debug!(url, "requesting pendle quote");
        let resp = self.client.get(url).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, url, "pendle quote rejected");
            return Err(VaultError::ExternalService {
                service: SERVICE.into(),
                message: format!("HTTP {status}: {}", truncate(&body)),
                transient: status.is_server_error(),
            });
        }
        let body = resp.text().await?;
        let parsed: QuoteResponse = serde_json::from_str(&body)
            .map_err(|e| VaultError::external(SERVICE, format!("malformed quote: {e}")))?;
        parsed.into_quote()
    }
}

impl QuoteResponse {
    fn into_quote(self) -> Result<PendleQuote, VaultError> {
        let value = match self.tx.value.as_deref() {
            Some(v) => parse_quantity(v)
                .map_err(|e| VaultError::external(SERVICE, format!("bad tx value: {e}")))?,
            None => U256::ZERO,
        };
        if self.tx.data.is_empty() {
            return Err(VaultError::external(SERVICE, "quote carries empty calldata"));
        }
        let spender_default = self.tx.to;
        let approvals = self
            .token_approvals
            .into_iter()
            .map(|a| TokenApproval {
                token: a.token,
                spender: a.spender.unwrap_or(spender_default),
            })
            .collect();
        let amount_out = self
            .data
            .and_then(|d| d.amount_out)
            .map(|s| parse_quantity(&s))
            .transpose()
            .map_err(|e| VaultError::external(SERVICE, format!("bad amountOut: {e}")))?;
        Ok(PendleQuote {
            tx: Call::new(self.tx.to, self.tx.data).with_value(value),
            approvals,
            amount_out,
        })
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}
