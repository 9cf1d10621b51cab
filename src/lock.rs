use std::collections::HashMap;
use std::sync::Arc;

use async_std::sync::Mutex;

/// Number of idle locks kept around before they are pruned.
const PRUNE_THRESHOLD: usize = 1024;

/// Per-key async mutexes, serialising same-process writers of one status
/// list so that they queue instead of racing on the store.
///
/// Writers in other processes are still handled by the store's
/// compare-and-swap.
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock for `key`. Hold the guard of `lock().await` for the duration of
    /// the load-modify-save cycle.
    pub fn get(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        if locks.len() >= PRUNE_THRESHOLD {
            // Only the map holds a reference to an idle lock.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[async_std::test]
    async fn same_key_same_lock() {
        let locks = KeyLocks::new();
        let a = locks.get("acme:status_lists:StatusList2021");
        let b = locks.get("acme:status_lists:StatusList2021");
        assert!(Arc::ptr_eq(&a, &b));
        let guard = a.lock().await;
        assert!(b.try_lock().is_none());
        drop(guard);
        assert!(b.try_lock().is_some());
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn idle_locks_are_pruned() {
        let locks = KeyLocks::new();
        let held = locks.get("held");
        for i in 0..PRUNE_THRESHOLD {
            locks.get(&format!("idle-{}", i));
        }
        assert!(locks.len() < PRUNE_THRESHOLD);
        assert!(Arc::ptr_eq(&held, &locks.get("held")));
    }
}
