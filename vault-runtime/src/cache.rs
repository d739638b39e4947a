//! TTL cache for balances and quotes with debounced, coalesced refresh.
//!
//! A refresh for a key waits out the debounce window before fetching; any
//! refresh for the same key issued while one is pending joins it and
//! receives the same result. Pending refreshes are tokio tasks so teardown
//! can abort them, which resolves every waiter with `Cancelled`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::primitives::{Address, U256};
use futures::future::{BoxFuture, FutureExt, Shared};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::amount;
use crate::error::VaultError;

/// Cache key for an owner's wallet balance of `token`.
pub fn wallet_key(chain_id: u64, token: Address, owner: Address) -> String {
    format!("wallet:{chain_id}:{token:#x}:{owner:#x}")
}

/// Cache key for an owner's deposited position in `market`.
pub fn position_key(chain_id: u64, market: Address, owner: Address) -> String {
    format!("position:{chain_id}:{market:#x}:{owner:#x}")
}

/// Token amount in base units together with its precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenBalance {
    pub raw: U256,
    pub decimals: u8,
}

impl TokenBalance {
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn to_decimal(&self) -> Option<Decimal> {
        amount::to_decimal(self.raw, self.decimals)
    }

    /// Balance rounded down to `digits` fractional digits.
    pub fn display(&self, digits: u8) -> String {
        amount::format_display(self.raw, self.decimals, digits)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub timestamp: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Valid iff `now - timestamp < ttl`.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.timestamp) < self.ttl
    }
}

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, VaultError>>>;

struct Pending<V> {
    generation: u64,
    future: SharedFetch<V>,
    abort: AbortHandle,
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    pending: HashMap<String, Pending<V>>,
    next_generation: u64,
}

pub struct BalanceQuoteCache<V> {
    inner: Arc<Mutex<Inner<V>>>,
    debounce: Duration,
}

impl<V> Clone for BalanceQuoteCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            debounce: self.debounce,
        }
    }
}

impl<V> BalanceQuoteCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                pending: HashMap::new(),
                next_generation: 0,
            })),
            debounce,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Value for `key` if present and within its TTL.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        self.lock()
            .entries
            .get(key)
            .filter(|e| e.is_valid_at(now))
            .map(|e| e.value.clone())
    }

    /// Replace the whole entry for `key`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            timestamp: Instant::now(),
            ttl,
        };
        self.lock().entries.insert(key.into(), entry);
    }

    /// Drop the entry and detach any in-flight refresh so its result is not stored.
    pub fn invalidate(&self, key: &str) {
        let mut inner = self.lock();
        inner.entries.remove(key);
        inner.pending.remove(key);
        debug!(key, "cache entry invalidated");
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.lock().pending.contains_key(key)
    }

    /// Cached value, or a debounced refresh when missing or expired.
    pub async fn get_or_refresh<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<V, VaultError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, VaultError>> + Send + 'static,
    {
        if let Some(v) = self.get(key) {
            return Ok(v);
        }
        self.refresh(key, ttl, fetch).await
    }

    /// Fetch a fresh value after the debounce window, joining a pending
    /// refresh for the same key if there is one. A transient failure is
    /// retried once; the stored entry is only written on success.
    pub async fn refresh<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<V, VaultError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, VaultError>> + Send + 'static,
    {
        let future = {
            let mut inner = self.lock();
            if let Some(pending) = inner.pending.get(key) {
                debug!(key, "joining pending refresh");
                pending.future.clone()
            } else {
                inner.next_generation += 1;
                let generation = inner.next_generation;
                let (future, abort) = self.spawn_fetch(key.to_string(), generation, ttl, fetch);
                inner.pending.insert(
                    key.to_string(),
                    Pending {
                        generation,
                        future: future.clone(),
                        abort,
                    },
                );
                future
            }
        };
        future.await
    }

    fn spawn_fetch<F, Fut>(
        &self,
        key: String,
        generation: u64,
        ttl: Duration,
        fetch: F,
    ) -> (SharedFetch<V>, AbortHandle)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, VaultError>> + Send + 'static,
    {
        let inner = self.inner.clone();
        let debounce = self.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let result = match fetch().await {
                Err(e) if e.is_transient() => {
                    warn!(key = %key, error = %e, "transient fetch failure, retrying once");
                    fetch().await
                }
                other => other,
            };

            let mut guard = inner.lock().unwrap_or_else(|p| p.into_inner());
            let current = guard
                .pending
                .get(&key)
                .is_some_and(|p| p.generation == generation);
            if current {
                guard.pending.remove(&key);
                if let Ok(value) = &result {
                    guard.entries.insert(
                        key.clone(),
                        CacheEntry {
                            value: value.clone(),
                            timestamp: Instant::now(),
                            ttl,
                        },
                    );
                }
            }
            result
        });
        let abort = handle.abort_handle();
        let future = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(VaultError::Cancelled("refresh aborted".into())),
                Err(e) => Err(VaultError::Unknown(format!("refresh task failed: {e}"))),
            }
        }
        .boxed()
        .shared();
        (future, abort)
    }

    /// Abort the pending refresh for `key`; its waiters get `Cancelled`.
    pub fn cancel_pending(&self, key: &str) {
        if let Some(p) = self.lock().pending.remove(key) {
            p.abort.abort();
            debug!(key, "pending refresh cancelled");
        }
    }

    /// Abort every pending refresh. Stored entries are kept.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.lock().pending.drain().collect();
        for (key, p) in drained {
            p.abort.abort();
            debug!(key = %key, "pending refresh cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_ttl_boundary() {
        let cache = BalanceQuoteCache::<u64>::new(Duration::from_millis(500));
        cache.set("k", 7, TTL);
        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        assert_eq!(cache.get("k"), Some(7));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_replaces_entry() {
        let cache = BalanceQuoteCache::<u64>::new(Duration::ZERO);
        cache.set("k", 1, Duration::from_secs(1));
        cache.set("k", 2, TTL);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get("k"), Some(2));
        cache.invalidate("k");
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_concurrent_refreshes() {
        let cache = BalanceQuoteCache::<u64>::new(Duration::from_millis(500));
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move { Ok(calls.fetch_add(1, Ordering::SeqCst) as u64 + 100) }
            }
        };

        let (a, b, c) = tokio::join!(
            cache.refresh("k", TTL, fetch.clone()),
            cache.refresh("k", TTL, fetch.clone()),
            cache.refresh("k", TTL, fetch),
        );
        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (100, 100, 100));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("k"), Some(100));
        assert!(!cache.is_pending("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retried_once() {
        let cache = BalanceQuoteCache::<u64>::new(Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let value = cache
            .refresh("k", TTL, move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(VaultError::NetworkTimeout("slow".into()))
                    } else {
                        Ok(9)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried_or_stored() {
        let cache = BalanceQuoteCache::<u64>::new(Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let err = cache
            .refresh("k", TTL, move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err(VaultError::external("pendle", "bad body")) }
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ExternalServiceError);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_waiters() {
        let cache = BalanceQuoteCache::<u64>::new(Duration::from_millis(500));
        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.refresh("k", TTL, || async { Ok(1) }).await })
        };
        while !cache.is_pending("k") {
            tokio::task::yield_now().await;
        }
        tokio::time::advance(Duration::from_millis(100)).await;

        cache.shutdown();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(VaultError::Cancelled(_))));
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_discards_in_flight_result() {
        let cache = BalanceQuoteCache::<u64>::new(Duration::from_millis(500));
        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.refresh("k", TTL, || async { Ok(1) }).await })
        };
        while !cache.is_pending("k") {
            tokio::task::yield_now().await;
        }
        cache.invalidate("k");
        assert_eq!(waiter.await.unwrap().unwrap(), 1);
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_keys_are_lowercase() {
        let token: Address = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".parse().unwrap();
        let owner = Address::repeat_byte(0xAB);
        let key = wallet_key(8453, token, owner);
        assert_eq!(key, key.to_lowercase());
        assert!(key.starts_with("wallet:8453:0x833589fcd6edb6e08f4c7c32d4f71b54bda02913:"));
    }
}
