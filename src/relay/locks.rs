//! Keyed async locks, one per workspace thread.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::context::ThreadKey;

/// Serializes work per thread while leaving different threads independent.
///
/// Entries are held weakly: once no handler holds or waits on a thread's
/// lock, its slot is pruned on the next acquisition.
pub struct ThreadLocks {
    locks: Mutex<HashMap<ThreadKey, Weak<Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &ThreadKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            match locks.get(key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    locks.retain(|_, slot| slot.strong_count() > 0);
                    let lock = Arc::new(Mutex::new(()));
                    locks.insert(key.clone(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Number of threads with a live lock.
    #[cfg(test)]
    pub async fn active(&self) -> usize {
        self.locks
            .lock()
            .await
            .values()
            .filter(|slot| slot.strong_count() > 0)
            .count()
    }
}

impl Default for ThreadLocks {
    fn default() -> Self {
        Self::new()
    }
}
