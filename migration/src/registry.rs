//! Capacity-bounded map evicting its oldest entries in batches.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, MigrationResult};

#[derive(Debug)]
struct RegistryInner<K, V> {
    entries: HashMap<K, V>,
    /// Keys in insertion order. Updating a key keeps its original position.
    order: VecDeque<K>,
}

/// Key-value map holding at most `capacity + trim_batch` entries.
///
/// When inserting a new key brings the number of entries to `capacity + trim_batch`, the
/// `trim_batch` oldest entries are evicted in one step. Updating an existing key never evicts.
#[derive(Debug)]
pub struct BoundedRegistry<K, V> {
    capacity: usize,
    trim_batch: usize,
    inner: Mutex<RegistryInner<K, V>>,
}

impl<K, V> BoundedRegistry<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty registry. Both `capacity` and `trim_batch` must be greater than zero.
    pub fn new(capacity: usize, trim_batch: usize) -> MigrationResult<Self> {
        if capacity == 0 || trim_batch == 0 {
            bail!(
                ErrorKind::ConfigError,
                "Registry capacity and trim batch must be greater than zero",
                format!("capacity: {capacity}, trim_batch: {trim_batch}")
            );
        }

        Ok(Self {
            capacity,
            trim_batch,
            inner: Mutex::new(RegistryInner {
                entries: HashMap::with_capacity(capacity + trim_batch),
                order: VecDeque::with_capacity(capacity + trim_batch),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or updates `key`.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.lock();
        self.insert_locked(&mut inner, key, value);
    }

    fn insert_locked(&self, inner: &mut RegistryInner<K, V>, key: K, value: V) {
        if inner.entries.insert(key.clone(), value).is_some() {
            return;
        }

        inner.order.push_back(key);
        if inner.order.len() >= self.capacity + self.trim_batch {
            for evicted in inner.order.drain(..self.trim_batch) {
                inner.entries.remove(&evicted);
            }

            debug!(
                evicted = self.trim_batch,
                remaining = inner.order.len(),
                "trimmed bounded registry"
            );
        }
    }

    /// Returns the value of `key`, or inserts the one built by `create` and returns it.
    ///
    /// Runs `create` under the registry lock, so concurrent callers never build two values for
    /// the same key.
    pub fn get_or_try_insert_with<F>(&self, key: K, create: F) -> MigrationResult<V>
    where
        F: FnOnce() -> MigrationResult<V>,
    {
        let mut inner = self.lock();
        if let Some(value) = inner.entries.get(&key) {
            return Ok(value.clone());
        }

        let value = create()?;
        self.insert_locked(&mut inner, key, value.clone());

        Ok(value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().entries.get(key).cloned()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        let removed = inner.entries.remove(key)?;
        inner.order.retain(|existing| existing != key);

        Some(removed)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Returns the values in insertion order.
    pub fn values(&self) -> Vec<V> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|key| inner.entries.get(key).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
