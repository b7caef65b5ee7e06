//! Synchronization helpers.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// A set of async mutexes, one per key.
///
/// Work on different keys proceeds concurrently; work on the same key is
/// serialized. Entries are dropped again through [`KeyedLocks::release`] once
/// nobody else holds a handle.
pub struct KeyedLocks<K> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the lock for `key`.
    pub fn get(&self, key: &K) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the lock for `key` if no caller still holds it.
    ///
    /// Call after dropping your own guard and handle.
    pub fn release(&self, key: &K) {
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_shares_lock() {
        let locks = KeyedLocks::new();
        let a = locks.get(&"k".to_string());
        let b = locks.get(&"k".to_string());
        assert!(Arc::ptr_eq(&a, &b));

        let _guard = a.lock().await;
        assert!(b.try_lock().is_err());
    }

    #[tokio::test]
    async fn different_keys_are_independent() {
        let locks = KeyedLocks::new();
        let a = locks.get(&1u32);
        let b = locks.get(&2u32);
        let _guard = a.lock().await;
        assert!(b.try_lock().is_ok());
    }

    #[test]
    fn release_keeps_held_locks() {
        let locks = KeyedLocks::new();
        let held = locks.get(&"a");
        locks.release(&"a");
        assert_eq!(locks.len(), 1);

        drop(held);
        locks.release(&"a");
        assert!(locks.is_empty());
    }
}
