//! Wallet-type persistence across restarts through the file store.

use std::sync::Arc;

use vault_runtime::mock::{MockWalletProvider, StaticIdentityProvider};
use vault_runtime::wallet::SessionState;
use vault_runtime::{ChainType, FileWalletTypeStore, VaultError, WalletSession};

const EVM: &str = "0x1111111111111111111111111111111111111111";
const SOL: &str = "7Np41oeYqPefeNQEHSv1UDhYrehxin3NStELsSKCT4K2";

fn identity(sol: Option<&str>) -> Arc<StaticIdentityProvider> {
    Arc::new(StaticIdentityProvider::new(
        Some(EVM),
        sol,
        Arc::new(MockWalletProvider::new(8453)),
    ))
}

#[tokio::test]
async fn test_active_type_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileWalletTypeStore::in_dir(dir.path()));

    let mut first = WalletSession::new(identity(Some(SOL)), store.clone(), "base");
    assert_eq!(first.login().await.unwrap(), ChainType::Ethereum);
    first.switch_wallet_type(ChainType::Solana).unwrap();
    assert!(store.path().exists());

    let mut second = WalletSession::new(identity(Some(SOL)), Arc::new(FileWalletTypeStore::in_dir(dir.path())), "base");
    assert_eq!(second.login().await.unwrap(), ChainType::Solana);
    assert_eq!(second.active_address(), Some(SOL));

    let raw = std::fs::read_to_string(store.path()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["activeWalletType"], "solana");
}

#[tokio::test]
async fn test_persisted_type_without_address_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("wallet-session.json"),
        r#"{"activeWalletType":"solana"}"#,
    )
    .unwrap();
    let store = Arc::new(FileWalletTypeStore::in_dir(dir.path()));
    let mut session = WalletSession::new(identity(None), store, "base");
    assert_eq!(session.login().await.unwrap(), ChainType::Ethereum);
}

#[tokio::test]
async fn test_create_wallet_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let ident = identity(None);
    let mut session = WalletSession::new(ident.clone(), Arc::new(FileWalletTypeStore::in_dir(dir.path())), "base");
    session.login().await.unwrap();

    assert!(matches!(
        session.switch_wallet_type(ChainType::Solana),
        Err(VaultError::WalletUnavailable(_))
    ));

    let created = session.create_wallet(ChainType::Solana).await.unwrap();
    let again = session.create_wallet(ChainType::Solana).await.unwrap();
    assert_eq!(created, again);
    assert_eq!(ident.create_count(), 1);
    assert_eq!(session.state(), SessionState::Ready { active: ChainType::Ethereum });

    session.switch_wallet_type(ChainType::Solana).unwrap();
    assert_eq!(session.active_address(), Some(created.as_str()));
}
