//! Wallet session: which wallet family is active, the addresses the
//! identity provider resolved for this login, and the signing capability.
//!
//! Only the active wallet type survives a restart; addresses are resolved
//! again from the identity provider on every login.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::VaultError;
use crate::provider::WalletProvider;
use crate::types::ChainType;

/// External identity / embedded-wallet service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Address of the user's wallet of `chain_type`, if one exists.
    async fn resolve_address(&self, chain_type: ChainType) -> Result<Option<String>, VaultError>;

    /// Create a wallet of `chain_type` and return its address.
    async fn create_wallet(&self, chain_type: ChainType) -> Result<String, VaultError>;

    /// Signing session for the EVM wallet.
    fn ethereum_provider(&self) -> Arc<dyn WalletProvider>;
}

/// Durable storage for the active wallet type.
pub trait WalletTypeStore: Send + Sync {
    fn load(&self) -> Result<Option<ChainType>, VaultError>;
    fn save(&self, chain_type: ChainType) -> Result<(), VaultError>;
}

const STORE_FILE: &str = "wallet-session.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedWalletType {
    active_wallet_type: ChainType,
}

/// JSON file holding the single `activeWalletType` key.
#[derive(Debug, Clone)]
pub struct FileWalletTypeStore {
    path: PathBuf,
}

impl FileWalletTypeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(STORE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WalletTypeStore for FileWalletTypeStore {
    fn load(&self) -> Result<Option<ChainType>, VaultError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(VaultError::ConfigError(format!(
                    "read {}: {e}",
                    self.path.display()
                )));
            }
        };
        match serde_json::from_str::<PersistedWalletType>(&raw) {
            Ok(persisted) => Ok(Some(persisted.active_wallet_type)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable wallet session file");
                Ok(None)
            }
        }
    }

    fn save(&self, chain_type: ChainType) -> Result<(), VaultError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VaultError::ConfigError(format!("create {}: {e}", parent.display())))?;
        }
        let body = serde_json::to_vec(&PersistedWalletType {
            active_wallet_type: chain_type,
        })
        .map_err(|e| VaultError::ConfigError(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| VaultError::ConfigError(format!("write {}: {e}", self.path.display())))
    }
}

#[derive(Debug, Default)]
pub struct MemoryWalletTypeStore {
    value: Mutex<Option<ChainType>>,
}

impl MemoryWalletTypeStore {
    pub fn with_value(chain_type: ChainType) -> Self {
        Self {
            value: Mutex::new(Some(chain_type)),
        }
    }
}

impl WalletTypeStore for MemoryWalletTypeStore {
    fn load(&self) -> Result<Option<ChainType>, VaultError> {
        Ok(*self.value.lock().unwrap_or_else(|p| p.into_inner()))
    }

    fn save(&self, chain_type: ChainType) -> Result<(), VaultError> {
        *self.value.lock().unwrap_or_else(|p| p.into_inner()) = Some(chain_type);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Ready {
        active: ChainType,
    },
    Creating {
        active: ChainType,
        target: ChainType,
    },
}

pub struct WalletSession {
    state: SessionState,
    addresses: HashMap<ChainType, Option<String>>,
    active_network_key: String,
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn WalletTypeStore>,
}

impl WalletSession {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn WalletTypeStore>,
        network_key: impl Into<String>,
    ) -> Self {
        Self {
            state: SessionState::Uninitialized,
            addresses: HashMap::new(),
            active_network_key: network_key.into(),
            identity,
            store,
        }
    }

    /// Resolve addresses from the identity provider and restore the
    /// persisted wallet type. Moves `Uninitialized → Ready`.
    pub async fn login(&mut self) -> Result<ChainType, VaultError> {
        for chain_type in [ChainType::Ethereum, ChainType::Solana] {
            let address = self.identity.resolve_address(chain_type).await?;
            self.addresses.insert(chain_type, address);
        }

        let persisted = self.store.load()?;
        let mut active = persisted.unwrap_or(ChainType::Ethereum);
        if self.address(active).is_none() && self.address(active.other()).is_some() {
            info!(
                preferred = active.as_str(),
                "persisted wallet type has no address, falling back"
            );
            active = active.other();
        }

        self.state = SessionState::Ready { active };
        info!(
            active = active.as_str(),
            network = %self.active_network_key,
            "wallet session ready"
        );
        Ok(active)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn active_type(&self) -> Option<ChainType> {
        match self.state {
            SessionState::Uninitialized => None,
            SessionState::Ready { active } | SessionState::Creating { active, .. } => Some(active),
        }
    }

    pub fn address(&self, chain_type: ChainType) -> Option<&str> {
        self.addresses
            .get(&chain_type)
            .and_then(|a| a.as_deref())
    }

    pub fn active_address(&self) -> Option<&str> {
        self.active_type().and_then(|t| self.address(t))
    }

    /// EVM address of the active wallet; fails unless the Ethereum wallet is active.
    pub fn ethereum_address(&self) -> Result<Address, VaultError> {
        match self.active_type() {
            Some(ChainType::Ethereum) => {}
            Some(ChainType::Solana) => {
                return Err(VaultError::WalletUnavailable(
                    "active wallet is a Solana wallet".into(),
                ));
            }
            None => {
                return Err(VaultError::WalletUnavailable(
                    "wallet session not initialized".into(),
                ));
            }
        }
        let raw = self
            .address(ChainType::Ethereum)
            .ok_or_else(|| VaultError::WalletUnavailable("no Ethereum wallet".into()))?;
        raw.parse::<Address>()
            .map_err(|e| VaultError::WalletUnavailable(format!("bad wallet address '{raw}': {e}")))
    }

    pub fn provider(&self) -> Arc<dyn WalletProvider> {
        self.identity.ethereum_provider()
    }

    pub fn network_key(&self) -> &str {
        &self.active_network_key
    }

    pub fn set_network_key(&mut self, network_key: impl Into<String>) {
        self.active_network_key = network_key.into();
    }

    /// Explicit switch; persisted on success.
    pub fn switch_wallet_type(&mut self, target: ChainType) -> Result<(), VaultError> {
        let SessionState::Ready { active } = self.state else {
            return Err(VaultError::WalletUnavailable(format!(
                "cannot switch while session is {:?}",
                self.state
            )));
        };
        if self.address(target).is_none() {
            return Err(VaultError::WalletUnavailable(format!(
                "no {} wallet to switch to",
                target.as_str()
            )));
        }
        if active != target {
            self.state = SessionState::Ready { active: target };
            info!(from = active.as_str(), to = target.as_str(), "switched wallet type");
        }
        self.store.save(target)
    }

    /// Create a wallet of `target`; a no-op when one already exists.
    pub async fn create_wallet(&mut self, target: ChainType) -> Result<String, VaultError> {
        match self.begin_create(target)? {
            WalletCreation::Existing(address) => Ok(address),
            WalletCreation::Started(identity) => {
                let created = identity.create_wallet(target).await;
                self.finish_create(target, created)
            }
        }
    }

    /// First half of [`create_wallet`](Self::create_wallet): moves
    /// `Ready → Creating` and hands back the identity provider so the
    /// caller can await creation without holding the session.
    pub fn begin_create(&mut self, target: ChainType) -> Result<WalletCreation, VaultError> {
        let SessionState::Ready { active } = self.state else {
            return Err(VaultError::WalletUnavailable(format!(
                "cannot create a wallet while session is {:?}",
                self.state
            )));
        };
        if let Some(existing) = self.address(target) {
            return Ok(WalletCreation::Existing(existing.to_string()));
        }
        self.state = SessionState::Creating { active, target };
        Ok(WalletCreation::Started(self.identity.clone()))
    }

    /// Second half: back to `Ready`, recording the address on success.
    pub fn finish_create(
        &mut self,
        target: ChainType,
        created: Result<String, VaultError>,
    ) -> Result<String, VaultError> {
        if let SessionState::Creating { active, .. } = self.state {
            self.state = SessionState::Ready { active };
        }
        let address = created?;
        info!(chain_type = target.as_str(), %address, "created wallet");
        self.addresses.insert(target, Some(address.clone()));
        Ok(address)
    }
}

/// Outcome of [`WalletSession::begin_create`].
pub enum WalletCreation {
    Existing(String),
    Started(Arc<dyn IdentityProvider>),
}
