//! Per-(network, chain, address) session initialization guard.
//!
//! Each key moves `Idle → Initializing → Ready`. Callers arriving while an
//! initialization is in flight await the same shared future instead of
//! starting another one. A failed initialization returns the key to `Idle`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::Address;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info};

use crate::error::VaultError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub network: String,
    pub chain_id: u64,
    pub address: Address,
}

impl SessionKey {
    /// Sessions sign for one chain, so the chain id is part of the key:
    /// a session initialized for another chain under the same network
    /// name is never reused.
    pub fn new(network: impl Into<String>, chain_id: u64, address: Address) -> Self {
        Self {
            network: network.into(),
            chain_id,
            address,
        }
    }
}

type SharedInit<S> = Shared<BoxFuture<'static, Result<Arc<S>, VaultError>>>;

enum SlotState<S> {
    Initializing { generation: u64, future: SharedInit<S> },
    Ready(Arc<S>),
}

/// Observable state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    Initializing,
    Ready,
}

struct Slots<S> {
    slots: HashMap<SessionKey, SlotState<S>>,
    next_generation: u64,
}

pub struct AdapterSessionGuard<S> {
    inner: Arc<Mutex<Slots<S>>>,
}

impl<S> Clone for AdapterSessionGuard<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> Default for AdapterSessionGuard<S>
where
    S: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> AdapterSessionGuard<S>
where
    S: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Slots {
                slots: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots<S>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self, key: &SessionKey) -> GuardState {
        match self.lock().slots.get(key) {
            None => GuardState::Idle,
            Some(SlotState::Initializing { .. }) => GuardState::Initializing,
            Some(SlotState::Ready(_)) => GuardState::Ready,
        }
    }

    pub fn get(&self, key: &SessionKey) -> Option<Arc<S>> {
        match self.lock().slots.get(key) {
            Some(SlotState::Ready(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Ready session for `key`, running `init` at most once across
    /// concurrent callers.
    pub async fn get_or_init<F, Fut>(&self, key: SessionKey, init: F) -> Result<Arc<S>, VaultError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, VaultError>> + Send + 'static,
    {
        let (future, generation) = {
            let mut slots = self.lock();
            match slots.slots.get(&key) {
                Some(SlotState::Ready(s)) => return Ok(s.clone()),
                Some(SlotState::Initializing { generation, future }) => {
                    debug!(network = %key.network, chain_id = key.chain_id, address = %key.address, "joining in-flight session init");
                    (future.clone(), *generation)
                }
                None => {
                    slots.next_generation += 1;
                    let generation = slots.next_generation;
                    let future = init().map(|r| r.map(Arc::new)).boxed().shared();
                    slots.slots.insert(
                        key.clone(),
                        SlotState::Initializing {
                            generation,
                            future: future.clone(),
                        },
                    );
                    (future, generation)
                }
            }
        };

        let result = future.await;

        let mut slots = self.lock();
        let still_current = matches!(
            slots.slots.get(&key),
            Some(SlotState::Initializing { generation: g, .. }) if *g == generation
        );
        if still_current {
            match &result {
                Ok(session) => {
                    info!(network = %key.network, chain_id = key.chain_id, address = %key.address, "adapter session ready");
                    slots.slots.insert(key, SlotState::Ready(session.clone()));
                }
                Err(e) => {
                    debug!(network = %key.network, error = %e, "adapter session init failed");
                    slots.slots.remove(&key);
                }
            }
        }
        result
    }

    /// Forget all sessions. In-flight initializations finish for their
    /// current waiters but are not stored.
    pub fn reset_all(&self) {
        self.lock().slots.clear();
    }
}
