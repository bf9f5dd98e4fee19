//! Local timers: how long an edge has been unrivaled.

use crate::{RoyalChallengeTree, TreeError};
use bold_challenger_primitives::Edge;

impl RoyalChallengeTree {
    /// Computes the number of blocks `edge` has spent unrivaled as of `at_block`.
    ///
    /// While the edge is unrivaled its timer grows with `at_block`. Once a rival has been
    /// created the timer freezes at the gap between the edge's creation and the earliest
    /// rival's creation, which is zero if a rival was created first.
    pub fn local_timer(&self, edge: &Edge, at_block: u64) -> u64 {
        if at_block <= edge.creation_block {
            return 0;
        }
        match self.earliest_created_rival_block_number(edge) {
            Some(rival_block) if rival_block <= at_block => {
                rival_block.saturating_sub(edge.creation_block)
            }
            _ => at_block - edge.creation_block,
        }
    }

    /// Returns `true` if no rival of `edge` had been created as of `at_block`.
    ///
    /// ### Returns
    /// - `Err(TreeError::BlockBeforeCreation)`: `at_block` precedes the edge's creation.
    pub fn unrivaled_at_block_num(&self, edge: &Edge, at_block: u64) -> Result<bool, TreeError> {
        if at_block < edge.creation_block {
            return Err(TreeError::BlockBeforeCreation {
                at_block,
                creation_block: edge.creation_block,
            });
        }
        Ok(self
            .earliest_created_rival_block_number(edge)
            .map_or(true, |rival_block| rival_block > at_block))
    }

    /// Returns `true` if any rival of `edge` has been observed, at any block.
    pub fn has_rival(&self, edge: &Edge) -> bool {
        self.earliest_created_rival_block_number(edge).is_some()
    }

    /// Returns the creation block of the earliest observed rival of `edge`, excluding the edge
    /// itself.
    pub(crate) fn earliest_created_rival_block_number(&self, edge: &Edge) -> Option<u64> {
        let rivals = self
            .rival_creation_times
            .get(&(edge.origin_id, edge.mutual_id))?;
        let mut earliest: Option<u64> = None;
        rivals.for_each(|id, created_at| {
            if *id != edge.id {
                earliest = Some(earliest.map_or(*created_at, |e| e.min(*created_at)));
            }
        });
        earliest
    }
}

#[cfg(test)]
mod test {
    use crate::fixtures::{honest_reader, tree_with};
    use crate::TreeError;
    use bold_challenger_primitives::test_utils::{edge, MockHistoryChecker};

    #[test]
    fn timer_of_unrivaled_edge_grows() {
        let (tree, _) = tree_with(honest_reader(), MockHistoryChecker::default());
        let alone = edge("blk-0.a-16.a", 3);
        tree.record_creation_time(&alone);

        assert_eq!(tree.local_timer(&alone, 0), 0);
        assert_eq!(tree.local_timer(&alone, 3), 0);
        let mut last = 0;
        for block in 3..50 {
            let timer = tree.local_timer(&alone, block);
            assert!(timer >= last);
            last = timer;
        }
        assert_eq!(tree.local_timer(&alone, 4), 1);
        assert_eq!(tree.local_timer(&alone, 1000), 997);
        assert!(!tree.has_rival(&alone));
    }

    #[test]
    fn timer_freezes_once_rivaled() {
        let (tree, _) = tree_with(honest_reader(), MockHistoryChecker::default());
        let a = edge("blk-0.a-16.a", 3);
        let b = edge("blk-0.a-16.b", 5);
        let c = edge("blk-0.a-16.c", 10);
        tree.record_creation_time(&a);
        tree.record_creation_time(&b);
        tree.record_creation_time(&c);

        // A's rival appears at block 5; before that A is unrivaled.
        assert_eq!(tree.local_timer(&a, 4), 1);
        for block in [5, 6, 10, 100, 1_000_000] {
            assert_eq!(tree.local_timer(&a, block), 2);
            // Rivals created after another edge never accumulate time.
            assert_eq!(tree.local_timer(&b, block), 0);
            assert_eq!(tree.local_timer(&c, block), 0);
        }
        assert!(tree.has_rival(&a));
    }

    #[test]
    fn rivals_in_other_origins_do_not_count() {
        let (tree, _) = tree_with(honest_reader(), MockHistoryChecker::default());
        let a = edge("big-0.a-16.a", 3);
        let b = bold_challenger_primitives::test_utils::EdgeBuilder::new("big-0.a-16.b")
            .origin(ethers::types::H256::repeat_byte(1).into())
            .created_at(4)
            .build();
        tree.record_creation_time(&a);
        tree.record_creation_time(&b);
        assert_eq!(tree.local_timer(&a, 10), 7);
    }

    #[test]
    fn unrivaled_at_block_num() {
        let (tree, _) = tree_with(honest_reader(), MockHistoryChecker::default());
        let a = edge("blk-0.a-16.a", 3);
        let b = edge("blk-0.a-16.b", 5);
        tree.record_creation_time(&a);
        assert!(tree.unrivaled_at_block_num(&a, 3).unwrap());
        tree.record_creation_time(&b);
        assert!(tree.unrivaled_at_block_num(&a, 4).unwrap());
        assert!(!tree.unrivaled_at_block_num(&a, 5).unwrap());
        assert!(!tree.unrivaled_at_block_num(&b, 5).unwrap());
        assert_eq!(
            tree.unrivaled_at_block_num(&a, 2),
            Err(TreeError::BlockBeforeCreation {
                at_block: 2,
                creation_block: 3
            })
        );
    }
}
