//! Inherited timers: the time an edge may count towards confirmation, inherited bottom-up from
//! its children and from the edges claiming it.

use crate::{RoyalChallengeTree, TreeError};
use anyhow::{Context, Result};
use bold_challenger_primitives::{Edge, EdgeId, InheritedTimer};
use std::collections::HashMap;

/// Where an edge inherits its timer from.
enum Inherits {
    Claiming(EdgeId),
    Children(EdgeId, EdgeId),
    Nothing,
}

enum Visit {
    Enter(EdgeId),
    Exit(Edge, Inherits),
}

impl RoyalChallengeTree {
    /// Computes the inherited timer of the royal edge `edge_id` at `at_block`.
    ///
    /// - A confirmed proof edge inherits [InheritedTimer::MAX].
    /// - A length one edge claimed by a royal edge one level down inherits that edge's timer,
    ///   and never reports less than its cached on-chain timer.
    /// - An edge with children inherits the smaller of its children's timers.
    /// - Any other edge only counts its own local timer.
    ///
    /// Local timers are added to the inherited value with saturation. The tree is walked with an
    /// explicit stack, so the depth of the challenge does not bound the computation.
    pub fn inherited_timer(
        &self,
        edge_id: &EdgeId,
        at_block: u64,
    ) -> Result<InheritedTimer, TreeError> {
        let total = self.total_challenge_levels();
        let mut timers: HashMap<EdgeId, InheritedTimer> = HashMap::new();
        let mut stack = vec![Visit::Enter(*edge_id)];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    if timers.contains_key(&id) {
                        continue;
                    }
                    let edge = self.edges.get(&id).ok_or(if id == *edge_id {
                        TreeError::NotFound(id)
                    } else {
                        TreeError::ChildrenNotYetSeen(id)
                    })?;
                    if edge.is_proof_edge(total) && edge.is_confirmed() {
                        timers.insert(id, InheritedTimer::MAX);
                        continue;
                    }
                    let inherits = if edge.has_length_one() {
                        self.find_claiming_edge(&edge)
                            .map_or(Inherits::Nothing, |claiming| Inherits::Claiming(claiming.id))
                    } else if let (Some(lower), Some(upper)) =
                        (edge.lower_child_id, edge.upper_child_id)
                    {
                        Inherits::Children(lower, upper)
                    } else {
                        Inherits::Nothing
                    };
                    let dependencies = match &inherits {
                        Inherits::Claiming(claiming) => vec![*claiming],
                        Inherits::Children(lower, upper) => vec![*lower, *upper],
                        Inherits::Nothing => vec![],
                    };
                    stack.push(Visit::Exit(edge, inherits));
                    stack.extend(dependencies.into_iter().map(Visit::Enter));
                }
                Visit::Exit(edge, inherits) => {
                    let local = self.local_timer(&edge, at_block);
                    let timer = match inherits {
                        Inherits::Claiming(claiming) => local
                            .saturating_add(timers[&claiming])
                            .max(edge.cached_inherited_timer),
                        Inherits::Children(lower, upper) => {
                            local.saturating_add(timers[&lower].min(timers[&upper]))
                        }
                        Inherits::Nothing => local,
                    };
                    timers.insert(edge.id, timer);
                }
            }
        }
        timers
            .get(edge_id)
            .copied()
            .ok_or(TreeError::NotFound(*edge_id))
    }

    /// Computes the inherited timer of the royal block challenge root edge, plus the number of
    /// blocks the top level assertion has been unrivaled for.
    pub async fn compute_root_inherited_timer(&self, at_block: u64) -> Result<InheritedTimer> {
        let root = self.block_challenge_root_edge()?;
        let timer = self
            .inherited_timer(&root.id, at_block)
            .with_context(|| format!("could not compute inherited timer of root {}", root.id))?;
        let unrivaled_blocks = self
            .metadata_reader
            .assertion_unrivaled_blocks(self.top_level_assertion_hash())
            .await
            .with_context(|| {
                format!(
                    "could not get assertion unrivaled blocks for {}",
                    self.top_level_assertion_hash()
                )
            })?;
        Ok(timer.saturating_add(unrivaled_blocks))
    }
}

#[cfg(test)]
mod test {
    use crate::fixtures::{honest_reader, three_level_snapshot, tree_with};
    use crate::TreeError;
    use bold_challenger_primitives::{
        test_utils::{assertion_hash, edge, link, EdgeBuilder, MockHistoryChecker, MockMetadataReader},
        EdgeStatus,
    };

    #[test]
    fn confirmed_proof_edge_is_infinite() {
        let (tree, _) = tree_with(honest_reader(), MockHistoryChecker::default());
        let mut proof = edge("smol-3.a-4.a", 1);
        tree.add_royal_edge(proof.clone()).unwrap();
        assert_eq!(tree.inherited_timer(&proof.id, 10).unwrap(), 9);

        tree.mark_edge_confirmed(&proof.id).unwrap();
        assert_eq!(tree.inherited_timer(&proof.id, 10).unwrap(), u64::MAX);

        // A confirmed edge that is not a proof edge only counts its local timer.
        proof = edge("big-3.a-4.a", 1);
        proof.status = EdgeStatus::Confirmed;
        tree.add_royal_edge(proof.clone()).unwrap();
        assert_eq!(tree.inherited_timer(&proof.id, 10).unwrap(), 9);
    }

    #[test]
    fn unbisected_edge_is_local_timer() {
        let (tree, _) = tree_with(honest_reader(), MockHistoryChecker::default());
        let big = edge("big-0.a-16.a", 1);
        tree.add_royal_edge(big.clone()).unwrap();
        assert_eq!(tree.inherited_timer(&big.id, 10).unwrap(), 9);
    }

    #[test]
    fn length_one_edge_inherits_from_claiming_edge() {
        let (tree, _) = tree_with(honest_reader(), MockHistoryChecker::default());
        let claimed = edge("blk-0.a-1.a", 1);
        let claiming = EdgeBuilder::new("big-0.a-32.a")
            .origin(claimed.mutual_id.into())
            .claim(claimed.id)
            .created_at(2)
            .build();
        tree.add_royal_edge(claimed.clone()).unwrap();
        tree.add_royal_edge(claiming).unwrap();
        assert_eq!(tree.inherited_timer(&claimed.id, 10).unwrap(), 9 + 8);

        // The cached on-chain timer is a floor.
        tree.update_cached_inherited_timer(&claimed.id, 100).unwrap();
        assert_eq!(tree.inherited_timer(&claimed.id, 10).unwrap(), 100);
    }

    #[test]
    fn parent_inherits_minimum_of_children() {
        let (tree, _) = tree_with(honest_reader(), MockHistoryChecker::default());
        let mut root = EdgeBuilder::new("blk-0.a-16.a")
            .claim(assertion_hash("assertion.a"))
            .created_at(1)
            .build();
        let lower = edge("blk-0.a-8.a", 3);
        let upper = edge("blk-8.a-16.a", 3);
        let rival = edge("blk-8.a-16.b", 5);
        link(&mut root, &lower, &upper);
        for e in [root.clone(), lower, upper] {
            tree.add_royal_edge(e).unwrap();
        }
        tree.record_creation_time(&rival);
        // Root 9, lower 7, upper frozen at 2.
        assert_eq!(tree.inherited_timer(&root.id, 10).unwrap(), 9 + 2);
    }

    #[test]
    fn whole_challenge_bottoms_out_in_deepest_level() {
        let snapshot = three_level_snapshot();
        let tree = &snapshot.tree;
        let timer = |name: &str| tree.inherited_timer(&snapshot.id(name), 40).unwrap();

        // The weakest branch at every level runs through 4-5, whose rival appeared one block
        // after it, and each edge on that branch was rivaled after one block too.
        assert_eq!(timer("smol-4.a-5.a"), 1);
        assert_eq!(timer("smol-4.a-6.a"), 2);
        assert_eq!(timer("smol-0.a-16.a"), 5);
        assert_eq!(timer("big-4.a-5.a"), 1 + 5);
        assert_eq!(timer("big-0.a-16.a"), 10);
        assert_eq!(timer("blk-4.a-5.a"), 1 + 10);
        assert_eq!(timer("blk-0.a-16.a"), 15);
        // Unrivaled leaves only count their own time.
        assert_eq!(timer("blk-8.a-16.a"), 37);

        // Once the proof edge is confirmed its sibling becomes the weakest link.
        tree.mark_edge_confirmed(&snapshot.id("smol-4.a-5.a")).unwrap();
        assert_eq!(timer("smol-4.a-5.a"), u64::MAX);
        assert_eq!(timer("smol-4.a-6.a"), 1 + 11);
        assert_eq!(timer("smol-0.a-16.a"), 15);
        assert_eq!(timer("big-0.a-16.a"), 20);
        assert_eq!(timer("blk-0.a-16.a"), 25);
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let (tree, _) = tree_with(honest_reader(), MockHistoryChecker::default());
        let mut parent = edge("smol-0.a-2.a", 1);
        let lower = edge("smol-0.a-1.a", 1);
        let upper = edge("smol-1.a-2.a", 1);
        link(&mut parent, &lower, &upper);
        for e in [parent.clone(), lower.clone(), upper.clone()] {
            tree.add_royal_edge(e).unwrap();
        }
        tree.mark_edge_confirmed(&lower.id).unwrap();
        tree.mark_edge_confirmed(&upper.id).unwrap();
        assert_eq!(tree.inherited_timer(&parent.id, u64::MAX).unwrap(), u64::MAX);
    }

    #[test]
    fn missing_edges() {
        let (tree, _) = tree_with(honest_reader(), MockHistoryChecker::default());
        let mut parent = edge("big-0.a-16.a", 1);
        let lower = edge("big-0.a-8.a", 3);
        let upper = edge("big-8.a-16.a", 3);
        link(&mut parent, &lower, &upper);
        assert_eq!(
            tree.inherited_timer(&parent.id, 10),
            Err(TreeError::NotFound(parent.id))
        );
        tree.add_royal_edge(parent.clone()).unwrap();
        tree.add_royal_edge(lower).unwrap();
        assert_eq!(
            tree.inherited_timer(&parent.id, 10),
            Err(TreeError::ChildrenNotYetSeen(upper.id))
        );
    }

    #[tokio::test]
    async fn root_inherited_timer_adds_unrivaled_blocks() {
        let reader = MockMetadataReader {
            unrivaled_blocks: 30,
            ..honest_reader()
        };
        let (tree, _) = tree_with(reader, MockHistoryChecker::default());
        let err = tree.compute_root_inherited_timer(10).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<TreeError>(),
            Some(&TreeError::NoHonestTopLevelEdge)
        );

        let root = EdgeBuilder::new("blk-0.a-16.a")
            .claim(assertion_hash("assertion.a"))
            .created_at(1)
            .build();
        tree.add_royal_edge(root).unwrap();
        assert_eq!(tree.compute_root_inherited_timer(10).await.unwrap(), 9 + 30);
    }
}
