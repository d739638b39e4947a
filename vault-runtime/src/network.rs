//! Chain-id gate run immediately before every mutating call.

use tracing::{debug, info, warn};

use crate::error::VaultError;
use crate::provider::{self, WalletProvider};

#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkValidator {
    auto_switch: bool,
}

impl NetworkValidator {
    pub fn new(auto_switch: bool) -> Self {
        Self { auto_switch }
    }

    /// Whether the session is on `expected` right now. Never cached.
    pub async fn is_on(provider: &dyn WalletProvider, expected: u64) -> Result<bool, VaultError> {
        Ok(provider::chain_id(provider).await? == expected)
    }

    /// Fails with `NetworkMismatch` unless the session reports `expected`.
    /// With auto-switch enabled, asks the wallet to switch once and reads
    /// the chain id again.
    pub async fn ensure(&self, provider: &dyn WalletProvider, expected: u64) -> Result<(), VaultError> {
        let actual = provider::chain_id(provider).await?;
        if actual == expected {
            debug!(chain_id = expected, "network validated");
            return Ok(());
        }
        if !self.auto_switch {
            warn!(expected, actual, "wallet on wrong network");
            return Err(VaultError::NetworkMismatch { expected, actual });
        }

        info!(from = actual, to = expected, "requesting network switch");
        provider::switch_chain(provider, expected).await?;
        let actual = provider::chain_id(provider).await?;
        if actual != expected {
            warn!(expected, actual, "network switch did not take effect");
            return Err(VaultError::NetworkMismatch { expected, actual });
        }
        Ok(())
    }
}
