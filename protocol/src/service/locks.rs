//! Per-identifier mutual exclusion.
//!
//! Every mutating operation runs load, guard, apply, persist as one
//! critical section per id. Without it, two concurrent signs could both
//! read `Verified = false` and both succeed.
//!
//! Entries are created on first use and removed when the last holder lets
//! go, so the map only ever holds ids with an operation in flight.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct IdLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held for the duration of one operation on one id.
#[derive(Debug)]
pub struct IdGuard<'a> {
    locks: &'a IdLocks,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: &str) -> IdGuard<'_> {
        let mutex = self.locks.entry(id.to_string()).or_default().clone();
        let guard = mutex.lock_owned().await;
        IdGuard {
            locks: self,
            id: id.to_string(),
            guard: Some(guard),
        }
    }

    /// Ids with an operation in flight or queued.
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map's own reference left means nobody holds or waits.
        self.locks
            .locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn entries_removed_after_release() {
        let locks = IdLocks::new();
        {
            let _guard = locks.lock("a").await;
            assert_eq!(locks.in_flight(), 1);
        }
        assert_eq!(locks.in_flight(), 0);
    }

    #[tokio::test]
    async fn different_ids_do_not_block() {
        let locks = IdLocks::new();
        let _a = locks.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_id_is_exclusive() {
        let locks = Arc::new(IdLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _guard = locks.lock("shared").await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.in_flight(), 0);
    }
}
