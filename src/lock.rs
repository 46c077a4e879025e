//! Per-resource mutual exclusion.
//!
//! Every protocol run holds the lock of its channel, and of the app it
//! touches, for its whole duration. Locks are taken in ascending key order so
//! two runs needing overlapping sets cannot deadlock.

use std::{
    collections::{BTreeSet, HashMap},
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use thiserror::Error;
use tokio::{sync::OwnedMutexGuard, time::Instant};
use tracing::{debug, warn};

use crate::abiencode::types::{Address, Hash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    Channel(Address),
    App(Hash),
}

impl core::fmt::Display for LockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LockKey::Channel(a) => write!(f, "channel {a}"),
            LockKey::App(h) => write!(f, "app {h}"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("timed out waiting for the lock of {0}")]
    Timeout(LockKey),
    #[error("lock table is poisoned")]
    Poisoned,
}

/// Held locks. Dropping it releases all of them.
#[derive(Debug)]
pub struct LockGuard {
    keys: Vec<LockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockGuard {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

// Entries are never removed.
#[derive(Debug)]
pub struct LockCoordinator {
    locks: Mutex<HashMap<LockKey, Arc<tokio::sync::Mutex<()>>>>,
    timeout: Duration,
}

impl LockCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn lock_for(&self, key: LockKey) -> Result<Arc<tokio::sync::Mutex<()>>, LockError> {
        let mut locks = self.locks.lock().map_err(|_| LockError::Poisoned)?;
        Ok(locks.entry(key).or_default().clone())
    }

    /// Acquire all `keys`, waiting at most the configured timeout in total.
    /// On timeout nothing stays held.
    pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> Result<LockGuard, LockError> {
        let keys: BTreeSet<LockKey> = keys.into_iter().collect();
        let deadline = Instant::now() + self.timeout;
        let mut guards = Vec::with_capacity(keys.len());

        for key in &keys {
            let lock = self.lock_for(*key)?;
            match tokio::time::timeout_at(deadline, lock.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    warn!(%key, "lock acquisition timed out");
                    return Err(LockError::Timeout(*key));
                }
            }
        }
        debug!(?keys, "locks acquired");
        Ok(LockGuard {
            keys: keys.into_iter().collect(),
            _guards: guards,
        })
    }

    /// Run `fut` while holding `keys`.
    pub async fn with_locks<F, T>(&self, keys: impl IntoIterator<Item = LockKey>, fut: F) -> Result<T, LockError>
    where
        F: Future<Output = T>,
    {
        let _guard = self.acquire(keys).await?;
        Ok(fut.await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn serializes_same_key() {
        let locks = Arc::new(LockCoordinator::new(Duration::from_secs(5)));
        let inside = Arc::new(AtomicUsize::new(0));
        let key = LockKey::Channel(Address([1; 20]));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            tasks.push(tokio::spawn(async move {
                locks
                    .with_locks([key], async {
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = LockCoordinator::new(Duration::from_millis(50));
        let _a = locks.acquire([LockKey::Channel(Address([1; 20]))]).await.unwrap();
        let _b = locks.acquire([LockKey::Channel(Address([2; 20]))]).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_and_releases_partial_set() {
        let locks = LockCoordinator::new(Duration::from_millis(100));
        let channel = LockKey::Channel(Address([1; 20]));
        let app = LockKey::App(Hash([2; 32]));

        let held = locks.acquire([app]).await.unwrap();
        assert_eq!(
            locks.acquire([channel, app]).await.unwrap_err(),
            LockError::Timeout(app)
        );
        // The channel lock taken on the way must have been released.
        locks.acquire([channel]).await.unwrap();
        drop(held);
        let guard = locks.acquire([app, channel]).await.unwrap();
        assert_eq!(guard.keys(), &[channel, app]);
    }
}
