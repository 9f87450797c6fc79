//! Process-level named locks. Each scheduler job acquires a lock scoped to
//! its own name for its full duration so overlapping invocations are
//! impossible; slip placement and resolution submission use shorter-lived
//! locks scoped by player / cycle id.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub struct LockRegistry {
    locks: DashMap<String, Arc<Mutex<()>>>,
    rate_windows: DashMap<String, Arc<Mutex<VecDeque<Instant>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
            rate_windows: DashMap::new(),
        }
    }

    /// Acquires the named lock, blocking until available. The returned guard
    /// releases the lock on drop, so panicking callers cannot leak it.
    pub async fn acquire(&self, name: &str) -> LockGuard {
        let mutex = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        LockGuard { _guard: guard }
    }

    /// Sliding-window rate check: returns `true` if a caller scoped to `key`
    /// may proceed now, recording the attempt if so. `limit` calls are
    /// allowed per `window`.
    pub async fn check_rate(&self, key: &str, limit: u32, window: Duration) -> bool {
        let bucket = self
            .rate_windows
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone();
        let mut entries = bucket.lock().await;
        let now = Instant::now();
        while let Some(oldest) = entries.front() {
            if now.duration_since(*oldest) > window {
                entries.pop_front();
            } else {
                break;
            }
        }
        if entries.len() as u32 >= limit {
            return false;
        }
        entries.push_back(now);
        true
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LockGuard {
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serializes_acquisitions_of_the_same_name() {
        let registry = Arc::new(LockRegistry::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let r1 = registry.clone();
        let o1 = order.clone();
        let h1 = tokio::spawn(async move {
            let _g = r1.acquire("newCycle").await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            o1.lock().await.push(1);
        });

        tokio::time::sleep(Duration::from_millis(5)).await;

        let r2 = registry.clone();
        let o2 = order.clone();
        let h2 = tokio::spawn(async move {
            let _g = r2.acquire("newCycle").await;
            o2.lock().await.push(2);
        });

        h1.await.unwrap();
        h2.await.unwrap();
        assert_eq!(*order.lock().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn rate_limit_allows_up_to_limit_then_blocks() {
        let registry = LockRegistry::new();
        for _ in 0..3 {
            assert!(registry.check_rate("placeSlip:0xabc", 3, Duration::from_secs(60)).await);
        }
        assert!(!registry.check_rate("placeSlip:0xabc", 3, Duration::from_secs(60)).await);
    }
}
