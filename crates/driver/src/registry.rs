//! The `registry` module contains [TrackedEdges], the set of edges with a live tracker.

use bold_challenger_primitives::{containers::ThreadSafeSet, EdgeId};

/// The [TrackedEdges] struct is the process wide record of which edges currently have a
/// tracker. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct TrackedEdges {
    inner: ThreadSafeSet<EdgeId>,
}

impl TrackedEdges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `edge_id` as tracked.
    ///
    /// ### Returns
    /// - `true` if the caller now owns the tracker for this edge, `false` if another tracker
    ///   already does.
    pub fn try_mark(&self, edge_id: EdgeId) -> bool {
        self.inner.insert(edge_id)
    }

    pub fn remove(&self, edge_id: &EdgeId) -> bool {
        self.inner.remove(edge_id)
    }

    pub fn is_tracking(&self, edge_id: &EdgeId) -> bool {
        self.inner.contains(edge_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::TrackedEdges;
    use bold_challenger_primitives::EdgeId;
    use ethers::types::H256;

    #[test]
    fn marks_each_edge_once() {
        let tracked = TrackedEdges::new();
        let id = EdgeId(H256::repeat_byte(1));
        assert!(tracked.try_mark(id));
        assert!(!tracked.clone().try_mark(id));
        assert!(tracked.is_tracking(&id));
        assert_eq!(tracked.len(), 1);

        assert!(tracked.remove(&id));
        assert!(!tracked.is_tracking(&id));
        assert!(tracked.try_mark(id));
    }
}
