//! Per-instance serialization of mutating operations.
//!
//! Operations on the same instance ID run one at a time; different IDs
//! proceed in parallel. Each entry counts the callers registered on it,
//! holders and waiters alike, and is removed when that count drops to zero,
//! including when a waiting `acquire` future is cancelled.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
struct Slot {
    mutex: Arc<Mutex<()>>,
    users: usize,
}

type LockMap = DashMap<String, Slot>;

#[derive(Debug, Default, Clone)]
pub struct InstanceLocks {
    locks: Arc<LockMap>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other holder of `instance_id` remains.
    pub async fn acquire(&self, instance_id: &str) -> InstanceGuard {
        let (registration, mutex) = self.register(instance_id);
        let guard = mutex.lock_owned().await;
        InstanceGuard {
            _guard: guard,
            _registration: registration,
        }
    }

    fn register(&self, instance_id: &str) -> (Registration, Arc<Mutex<()>>) {
        let mut slot = self.locks.entry(instance_id.to_string()).or_default();
        slot.users += 1;
        let mutex = Arc::clone(&slot.mutex);
        drop(slot);
        let registration = Registration {
            locks: Arc::clone(&self.locks),
            instance_id: instance_id.to_string(),
        };
        (registration, mutex)
    }

    /// IDs currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// One caller's claim on a map entry, released on drop.
struct Registration {
    locks: Arc<LockMap>,
    instance_id: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Entry::Occupied(mut slot) = self.locks.entry(self.instance_id.clone()) {
            slot.get_mut().users -= 1;
            if slot.get().users == 0 {
                slot.remove();
            }
        }
    }
}

/// Held for the duration of an operation on one instance.
pub struct InstanceGuard {
    // Declared first so the mutex is released before the entry can be removed.
    _guard: OwnedMutexGuard<()>,
    _registration: Registration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = InstanceLocks::new();
        let guard = locks.acquire("i1").await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_id_is_serialized() {
        let locks = InstanceLocks::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _guard = locks.acquire("i1").await;
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_entry() {
        let locks = InstanceLocks::new();
        let guard = locks.acquire("i1").await;

        let waited = tokio::time::timeout(Duration::from_millis(10), locks.acquire("i1")).await;
        assert!(waited.is_err());
        assert_eq!(locks.len(), 1);

        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_aborted_after_holder_leaves() {
        let locks = InstanceLocks::new();
        let guard = locks.acquire("i1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("i1").await;
                std::future::pending::<()>().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        drop(guard);
        assert_eq!(locks.len(), 1);
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let locks = InstanceLocks::new();
        let _a = locks.acquire("i1").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("i2")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
