use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::types::CacheKey;

/// Per-key mutual exclusion for cache regeneration.
///
/// Requests that miss the cache for the same key queue behind one another;
/// the first one renders and writes, the rest find the fresh entry once they
/// get the lock. Entries are dropped from the table when the last holder or
/// waiter releases them.
#[derive(Debug, Default, Clone)]
pub struct KeyLocks {
    inner: Arc<DashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &CacheKey) -> KeyLockGuard {
        // Created before waiting so a cancelled waiter still prunes the entry.
        let mut held = KeyLockGuard {
            key: key.clone(),
            guard: None,
            table: Arc::clone(&self.inner),
        };
        // Clone the mutex out so the shard lock is released before awaiting.
        let mutex = Arc::clone(self.inner.entry(key.clone()).or_default().value());
        held.guard = Some(mutex.lock_owned().await);
        held
    }

    /// Number of keys currently held or awaited.
    pub fn in_flight(&self) -> usize {
        self.inner.len()
    }
}

pub struct KeyLockGuard {
    key: CacheKey,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<DashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.table
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
