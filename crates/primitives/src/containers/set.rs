use parking_lot::RwLock;
use std::{collections::HashSet, hash::Hash, sync::Arc};

/// The [ThreadSafeSet] struct is a [HashSet] guarded by a reader/writer lock.
#[derive(Debug)]
pub struct ThreadSafeSet<T> {
    inner: Arc<RwLock<HashSet<T>>>,
}

impl<T> Clone for ThreadSafeSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ThreadSafeSet<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashSet::new())),
        }
    }
}

impl<T: Eq + Hash + Clone> ThreadSafeSet<T> {
    /// Creates a new, empty [ThreadSafeSet].
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `item`, returning `true` if it was not already present.
    pub fn insert(&self, item: T) -> bool {
        self.inner.write().insert(item)
    }

    /// Removes `item`, returning `true` if it was present.
    pub fn remove(&self, item: &T) -> bool {
        self.inner.write().remove(item)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.inner.read().contains(item)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
