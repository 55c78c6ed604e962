//! # SafeMap
//!
//! A `HashMap` behind a reader/writer lock. Readers never block each other,
//! a writer excludes everyone else. Each call takes the lock once, so a
//! closure passed to [`SafeMap::update`] sees and mutates a value atomically.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Key/value capability shared by concurrent stores.
///
/// Each operation is atomic for its own key only; there is no multi-key
/// transaction at this level.
pub trait KeyValueStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn set(&self, key: K, value: V);
    /// Snapshot of the keys, in no particular order.
    fn keys(&self) -> Vec<K>;
    /// Snapshot of the values, in no particular order.
    fn values(&self) -> Vec<V>;
}

#[derive(Debug)]
pub struct SafeMap<K, V> {
    data: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for SafeMap<K, V> {
    fn default() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, V> SafeMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` on the value under the read lock.
    pub fn read<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.read_guard().get(key).map(f)
    }

    /// Runs `f` on the value under the write lock.
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.write_guard().get_mut(key).map(f)
    }

    /// Runs `f` over the whole map under the read lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&HashMap<K, V>) -> R) -> R {
        f(&self.read_guard())
    }

    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_guard().is_empty()
    }

    // Writers only ever insert fully built values, so the map stays
    // consistent even if a holder of the lock panicked.
    fn read_guard(&self) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.data.read().unwrap_or_else(|poisoned| {
            log::warn!("SafeMap read lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.data.write().unwrap_or_else(|poisoned| {
            log::warn!("SafeMap write lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }
}

impl<K, V> KeyValueStore<K, V> for SafeMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.read_guard().get(key).cloned()
    }

    fn set(&self, key: K, value: V) {
        self.write_guard().insert(key, value);
    }

    fn keys(&self) -> Vec<K> {
        self.read_guard().keys().cloned().collect()
    }

    fn values(&self) -> Vec<V> {
        self.read_guard().values().cloned().collect()
    }
}
