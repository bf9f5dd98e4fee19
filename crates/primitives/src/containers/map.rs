use parking_lot::RwLock;
use std::{collections::HashMap, hash::Hash, sync::Arc};

/// The [ThreadSafeMap] struct is a [HashMap] guarded by a reader/writer lock. Values are cloned
/// out on reads so no lock guard ever escapes the map.
#[derive(Debug)]
pub struct ThreadSafeMap<K, V> {
    inner: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> Clone for ThreadSafeMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for ThreadSafeMap<K, V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for ThreadSafeMap<K, V>
where
    K: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: Arc::new(RwLock::new(iter.into_iter().collect())),
        }
    }
}

impl<K, V> ThreadSafeMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a new, empty [ThreadSafeMap].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the value stored under `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    pub fn has(&self, key: &K) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Inserts `value` under `key`, overwriting any previous value.
    pub fn insert(&self, key: K, value: V) {
        self.inner.write().insert(key, value);
    }

    /// Inserts `value` under `key` only if the key is vacant.
    ///
    /// ### Returns
    /// - `true` if the value was inserted, `false` if the key was already present.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let mut guard = self.inner.write();
        if guard.contains_key(&key) {
            return false;
        }
        guard.insert(key, value);
        true
    }

    /// Returns the value under `key`, inserting the result of `init` first if the key is vacant.
    /// The check and the insert happen under a single write lock.
    pub fn get_or_insert_with<F>(&self, key: K, init: F) -> V
    where
        F: FnOnce() -> V,
    {
        self.inner.write().entry(key).or_insert_with(init).clone()
    }

    /// Applies `f` to the value under `key` in place.
    ///
    /// ### Returns
    /// - `true` if the key was present and `f` ran.
    pub fn update<F>(&self, key: &K, f: F) -> bool
    where
        F: FnOnce(&mut V),
    {
        match self.inner.write().get_mut(key) {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        }
    }

    /// Returns a clone of the first value matching `predicate`. Iteration order is unspecified.
    pub fn find<F>(&self, mut predicate: F) -> Option<V>
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.inner
            .read()
            .iter()
            .find(|(k, v)| predicate(*k, *v))
            .map(|(_, v)| v.clone())
    }

    /// Calls `f` for every entry while holding the read lock.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        self.inner.read().iter().for_each(|(k, v)| f(k, v));
    }

    /// Returns a snapshot of all values.
    pub fn values(&self) -> Vec<V> {
        self.inner.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
