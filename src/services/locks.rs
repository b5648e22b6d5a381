use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key mutual exclusion: `acquire` serializes work on one logical key
/// (reconciliation per payment id), `try_acquire` gives single-flight
/// semantics (at most one payout sweep per queue in progress).
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.entry(key).lock_owned().await
    }

    pub fn try_acquire(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        self.entry(key).try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn try_acquire_is_single_flight() {
        let locks = KeyedLocks::new();

        let guard = locks.try_acquire("queue-a");
        assert!(guard.is_some());
        assert!(locks.try_acquire("queue-a").is_none());
        // a different key is unaffected
        assert!(locks.try_acquire("queue-b").is_some());

        drop(guard);
        assert!(locks.try_acquire("queue-a").is_some());
    }

    #[tokio::test]
    async fn acquire_serializes_the_same_key() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let locks = Arc::new(KeyedLocks::new());
        let in_critical_section = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_critical_section = in_critical_section.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("payment-1").await;
                assert!(!in_critical_section.swap(true, Ordering::SeqCst));
                tokio::task::yield_now().await;
                in_critical_section.store(false, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
