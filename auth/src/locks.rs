//! Per-key asynchronous mutual exclusion.
//!
//! Issuing and verifying a code for one (subject, purpose) pair must not
//! interleave. [`KeyedLocks`] hands out one `tokio` mutex per key; entries
//! are removed again once nobody holds or waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Map of per-key async locks. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    map: Arc<Mutex<LockMap>>,
}

impl KeyedLocks {
    /// Create an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    ///
    /// The returned guard releases the key when dropped, including when the
    /// owning future is cancelled.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let entry = {
            let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(key.to_owned()).or_default())
        };

        let guard = Arc::clone(&entry).lock_owned().await;

        KeyGuard {
            guard: Some(guard),
            entry,
            key: key.to_owned(),
            map: Arc::clone(&self.map),
        }
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` when no key is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries left behind by waiters that were cancelled.
    ///
    /// Returns the number of entries removed.
    pub fn prune(&self) -> usize {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        let before = map.len();
        map.retain(|_, entry| Arc::strong_count(entry) > 1);
        before - map.len()
    }
}

/// Exclusive access to one key.
#[derive(Debug)]
pub struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    entry: Arc<AsyncMutex<()>>,
    key: String,
    map: Arc<Mutex<LockMap>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release first so the guard's own reference no longer counts.
        self.guard.take();

        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = map
            .get(&self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.entry))
            && Arc::strong_count(&self.entry) == 2;
        if idle {
            map.remove(&self.key);
        }
    }
}
