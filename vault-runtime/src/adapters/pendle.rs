use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use super::{ExecutionMode, ProtocolAdapter, read_uint, wrong_market};
use crate::amount::{self, AmountSpec};
use crate::approval::ApprovalOrchestrator;
use crate::cache::BalanceQuoteCache;
use crate::encoder::{self, CallEncoder, sigs};
use crate::error::VaultError;
use crate::provider::WalletProvider;
use crate::quote::{PendleClient, PendleQuote, RedeemRequest, SwapRequest};
use crate::types::{CallPlan, Direction, ProtocolDetails, ProtocolKind, VaultMarketInfo};

#[derive(Debug, Clone, Copy)]
enum QuoteRequest {
    Swap(SwapRequest),
    Redeem(RedeemRequest),
}

/// Pendle fixed-yield markets. Deposits swap the asset into PT, withdrawals
/// redeem PT back into the asset; both are priced by the routing API and
/// submitted as one gasless batch with the approvals the quote lists.
pub struct PendleAdapter {
    client: PendleClient,
    encoder: CallEncoder,
    approvals: ApprovalOrchestrator,
    min_amount: Decimal,
    quote_ttl: Duration,
    quotes: BalanceQuoteCache<PendleQuote>,
}

impl PendleAdapter {
    pub fn new(
        client: PendleClient,
        encoder: CallEncoder,
        approvals: ApprovalOrchestrator,
        min_amount: Decimal,
        quote_ttl: Duration,
        debounce: Duration,
    ) -> Self {
        Self {
            client,
            encoder,
            approvals,
            min_amount,
            quote_ttl,
            quotes: BalanceQuoteCache::new(debounce),
        }
    }

    fn tokens(vault: &VaultMarketInfo) -> Result<(Address, Address), VaultError> {
        match vault.details {
            ProtocolDetails::Pendle {
                pt_address,
                yt_address,
            } => Ok((pt_address, yt_address)),
            _ => Err(wrong_market(ProtocolKind::Pendle, vault)),
        }
    }

    /// Rejects amounts below the protocol minimum, compared in base units.
    pub fn check_minimum(&self, vault: &VaultMarketInfo, amount: U256) -> Result<(), VaultError> {
        let min = amount::to_base_units(&self.min_amount.to_string(), vault.decimals)?;
        if amount < min {
            return Err(VaultError::InvalidAmount(format!(
                "{} {} is below the Pendle minimum of {}",
                amount::from_base_units(amount, vault.decimals),
                vault.symbol,
                self.min_amount
            )));
        }
        Ok(())
    }

    fn request(
        vault: &VaultMarketInfo,
        owner: Address,
        direction: Direction,
        amount_in: U256,
    ) -> Result<QuoteRequest, VaultError> {
        let (pt, yt) = Self::tokens(vault)?;
        Ok(match direction {
            Direction::Deposit => QuoteRequest::Swap(SwapRequest {
                chain_id: vault.chain_id,
                market: vault.market_address,
                receiver: owner,
                token_in: vault.asset_address,
                token_out: pt,
                amount_in,
            }),
            Direction::Withdraw => QuoteRequest::Redeem(RedeemRequest {
                chain_id: vault.chain_id,
                yt,
                receiver: owner,
                token_out: vault.asset_address,
                amount_in,
            }),
        })
    }

    fn quote_key(vault: &VaultMarketInfo, owner: Address, direction: Direction, amount_in: U256) -> String {
        let dir = match direction {
            Direction::Deposit => "swap",
            Direction::Withdraw => "redeem",
        };
        format!(
            "quote:{}:{:#x}:{dir}:{amount_in}:{owner:#x}",
            vault.chain_id, vault.market_address
        )
    }

    /// Quote through the cache. `fresh` bypasses a stored quote but still
    /// coalesces with a refresh already pending for the same key.
    async fn fetch_quote(
        &self,
        vault: &VaultMarketInfo,
        owner: Address,
        direction: Direction,
        amount_in: U256,
        fresh: bool,
    ) -> Result<PendleQuote, VaultError> {
        let request = Self::request(vault, owner, direction, amount_in)?;
        let key = Self::quote_key(vault, owner, direction, amount_in);
        let client = self.client.clone();
        let fetch = move || {
            let client = client.clone();
            async move {
                match request {
                    QuoteRequest::Swap(r) => client.swap_quote(&r).await,
                    QuoteRequest::Redeem(r) => client.redeem_quote(&r).await,
                }
            }
        };
        if fresh {
            self.quotes.refresh(&key, self.quote_ttl, fetch).await
        } else {
            self.quotes.get_or_refresh(&key, self.quote_ttl, fetch).await
        }
    }

    async fn pt_balance(&self, provider: &dyn WalletProvider, owner: Address, vault: &VaultMarketInfo) -> Result<U256, VaultError> {
        let (pt, _) = Self::tokens(vault)?;
        read_uint(provider, &self.encoder, pt, sigs::BALANCE_OF, &[encoder::address(owner)]).await
    }

    /// PT amount to redeem for a withdraw request.
    async fn redeem_amount(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
        amount: AmountSpec,
    ) -> Result<U256, VaultError> {
        match amount {
            AmountSpec::Exact(v) => Ok(v),
            AmountSpec::All => {
                let balance = self.pt_balance(provider, owner, vault).await?;
                if balance.is_zero() {
                    return Err(VaultError::InsufficientBalance {
                        have: "0".into(),
                        need: amount::WITHDRAW_ALL.into(),
                    });
                }
                Ok(balance)
            }
        }
    }

    async fn plan_from_quote(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        quote: PendleQuote,
        amount_in: U256,
    ) -> Result<CallPlan, VaultError> {
        let mut plan = CallPlan::new();
        for approval in &quote.approvals {
            plan.extend(
                self.approvals
                    .ensure_allowance(provider, owner, approval.spender, approval.token, amount_in)
                    .await?,
            );
        }
        plan.push(quote.tx);
        Ok(plan)
    }
}

#[async_trait]
impl ProtocolAdapter for PendleAdapter {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Pendle
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Gasless
    }

    fn min_amount(&self) -> Option<Decimal> {
        Some(self.min_amount)
    }

    async fn plan_deposit(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
        amount: U256,
    ) -> Result<CallPlan, VaultError> {
        self.check_minimum(vault, amount)?;
        let quote = self.fetch_quote(vault, owner, Direction::Deposit, amount, true).await?;
        debug!(market = %vault.market_address, approvals = quote.approvals.len(), "swap quote received");
        self.plan_from_quote(provider, owner, quote, amount).await
    }

    async fn plan_withdraw(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
        amount: AmountSpec,
    ) -> Result<CallPlan, VaultError> {
        if let AmountSpec::Exact(v) = amount {
            self.check_minimum(vault, v)?;
        }
        let amount_in = self.redeem_amount(provider, owner, vault, amount).await?;
        let quote = self
            .fetch_quote(vault, owner, Direction::Withdraw, amount_in, true)
            .await?;
        debug!(market = %vault.market_address, approvals = quote.approvals.len(), "redeem quote received");
        self.plan_from_quote(provider, owner, quote, amount_in).await
    }

    async fn deposited_balance(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
    ) -> Result<U256, VaultError> {
        self.pt_balance(provider, owner, vault).await
    }

    async fn quote(
        &self,
        provider: &dyn WalletProvider,
        owner: Address,
        vault: &VaultMarketInfo,
        amount: AmountSpec,
        direction: Direction,
    ) -> Result<Option<PendleQuote>, VaultError> {
        let amount_in = match (direction, amount) {
            (Direction::Deposit, AmountSpec::All) => {
                return Err(VaultError::InvalidAmount(
                    "'all' is only valid for withdrawals".into(),
                ));
            }
            (Direction::Deposit, AmountSpec::Exact(v)) => {
                self.check_minimum(vault, v)?;
                v
            }
            (Direction::Withdraw, spec) => self.redeem_amount(provider, owner, vault, spec).await?,
        };
        self.fetch_quote(vault, owner, direction, amount_in, false)
            .await
            .map(Some)
    }

    fn shutdown(&self) {
        self.quotes.shutdown();
    }
}
