use parking_lot::RwLock;
use std::sync::Arc;

/// The [ThreadSafeSlice] struct is an append-only [Vec] guarded by a reader/writer lock.
#[derive(Debug)]
pub struct ThreadSafeSlice<T> {
    inner: Arc<RwLock<Vec<T>>>,
}

impl<T> Clone for ThreadSafeSlice<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ThreadSafeSlice<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<T: Clone> ThreadSafeSlice<T> {
    /// Creates a new, empty [ThreadSafeSlice].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.inner.write().push(item);
    }

    /// Appends `item` unless an existing element matches `is_duplicate`. The check and the
    /// append happen under a single write lock.
    ///
    /// ### Returns
    /// - `true` if the item was appended.
    pub fn push_unless<F>(&self, item: T, mut is_duplicate: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        let mut guard = self.inner.write();
        if guard.iter().any(|existing| is_duplicate(existing)) {
            return false;
        }
        guard.push(item);
        true
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.read().get(index).cloned()
    }

    /// Returns a clone of the first element matching `predicate`, in insertion order.
    pub fn find<F>(&self, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        self.inner.read().iter().find(|item| predicate(*item)).cloned()
    }

    /// Returns a snapshot of the elements in insertion order.
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
