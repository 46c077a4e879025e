use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use super::{Store, StoreError};

/// In-process [Store], mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    delay: Option<Duration>,
    fail_next: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation sleeps for `delay` first.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make the next `set` fail without writing anything.
    pub fn fail_next_set(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("poisoned".to_owned()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.wait().await;
        Ok(self.lock()?.get(path).cloned())
    }

    async fn set(&self, entries: Vec<(String, Option<Vec<u8>>)>) -> Result<(), StoreError> {
        self.wait().await;
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected failure".to_owned()));
        }
        let mut map = self.lock()?;
        for (path, value) in entries {
            match value {
                Some(v) => map.insert(path, v),
                None => map.remove(&path),
            };
        }
        Ok(())
    }
}
