//! Vault operation runtime.
//!
//! Turns a deposit or withdraw request for a yield market (Aave, Compound,
//! Pendle, Morpho) into an encoded, network-checked call plan and submits
//! it from the user's wallet or as one sponsored batch.

pub mod adapters;
pub mod amount;
pub mod approval;
pub mod cache;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod encoder;
pub mod error;
pub mod executor;
pub mod gasless;
pub mod guard;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod network;
pub mod operations;
pub mod provider;
pub mod quote;
pub mod types;
pub mod wallet;

pub use adapters::{AdapterRegistry, ExecutionMode, ProtocolAdapter};
pub use amount::AmountSpec;
pub use cache::{BalanceQuoteCache, TokenBalance};
pub use config::{ApprovalPolicy, GaslessConfig, RuntimeConfig};
pub use encoder::{CallEncoder, EncoderMode};
pub use error::{ErrorKind, ProviderError, VaultError};
pub use operations::{VaultOperations, WalletSnapshot};
pub use provider::WalletProvider;
pub use types::*;
pub use wallet::{FileWalletTypeStore, IdentityProvider, WalletSession, WalletTypeStore};
