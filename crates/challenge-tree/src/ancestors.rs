//! Ancestor chains: the honest edges between an edge and the block challenge root, across every
//! challenge level.

use crate::{RoyalChallengeTree, TreeError};
use anyhow::{Context, Result};
use bold_challenger_primitives::{bisection::bisect, Edge, EdgeId, OriginId};

/// The [Ancestor] struct pairs an ancestor edge with its local timer at the queried block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ancestor {
    pub edge: Edge,
    pub local_timer: u64,
}

impl RoyalChallengeTree {
    /// Computes the ancestors of the royal edge `edge_id`, ordered from its parent up to the
    /// royal block challenge root edge.
    ///
    /// Ancestors at each level are found by walking down from the level's royal root edge along
    /// the bisection points towards the queried edge. Levels are then crossed by following each
    /// level root's claim to the edge it claims one level up.
    ///
    /// ### Takes
    /// - `edge_id`: The id of a tracked royal edge.
    /// - `at_block`: The block to compute the ancestors' local timers at.
    ///
    /// ### Returns
    /// - `Ok(Vec<Ancestor>)`: The ancestors, child to parent. Empty for the block challenge root.
    /// - `Err(TreeError)`: A part of the chain is not tracked yet, see
    ///   [TreeError::is_not_yet_available].
    pub fn compute_ancestors(
        &self,
        edge_id: &EdgeId,
        at_block: u64,
    ) -> Result<Vec<Ancestor>, TreeError> {
        let edge = self
            .edges
            .get(edge_id)
            .ok_or(TreeError::NotFound(*edge_id))?;
        self.compute_ancestors_for_edge(&edge, at_block)
    }

    /// Computes the ancestors of `query`, which need not be tracked itself. This lets edges be
    /// checked for an honest ancestry before they are added.
    pub(crate) fn compute_ancestors_for_edge(
        &self,
        query: &Edge,
        at_block: u64,
    ) -> Result<Vec<Ancestor>, TreeError> {
        let total = self.total_challenge_levels();
        let mut reversed = self.reversed_level(query.challenge_level)?;
        let mut cursor = query.clone();
        let mut ancestors = Vec::new();

        loop {
            let root = self.royal_root_with_origin(reversed, &cursor)?;
            let root_claim = root.claim_id;
            let root_id = root.id;

            let mut within_level = self.walk_within_level(root, &cursor, at_block)?;
            within_level.reverse();
            ancestors.extend(within_level);

            reversed += 1;
            if reversed >= total {
                break;
            }

            let claim_id = root_claim.ok_or(TreeError::NoClaim(root_id))?;
            let claimed_id = EdgeId::from(claim_id);
            let claimed = self
                .edges
                .get(&claimed_id)
                .ok_or(TreeError::ClaimedEdgeNotFound(claimed_id))?;
            ancestors.push(Ancestor {
                local_timer: self.local_timer(&claimed, at_block),
                edge: claimed.clone(),
            });
            cursor = claimed;
        }
        Ok(ancestors)
    }

    /// Computes the honest path timer of `edge_id`: its local timer, plus every ancestor's local
    /// timer, plus the number of blocks the top level assertion has been unrivaled for.
    ///
    /// ### Returns
    /// - `Ok((u64, Vec<Ancestor>))`: The saturating path timer and the ancestors it spans.
    pub async fn compute_honest_path_timer(
        &self,
        edge_id: &EdgeId,
        at_block: u64,
    ) -> Result<(u64, Vec<Ancestor>)> {
        let edge = self
            .edges
            .get(edge_id)
            .ok_or(TreeError::NotFound(*edge_id))?;
        let ancestors = self.compute_ancestors_for_edge(&edge, at_block)?;
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
        let timer = ancestors
            .iter()
            .fold(self.local_timer(&edge, at_block), |acc, ancestor| {
                acc.saturating_add(ancestor.local_timer)
            })
            .saturating_add(unrivaled_blocks);
        Ok((timer, ancestors))
    }

    /// Returns the closest edge carrying a claim id on the ancestor chain of `edge_id`, which is
    /// the edge itself when it carries one.
    pub fn closest_essential_ancestor(&self, edge_id: &EdgeId) -> Result<Edge, TreeError> {
        let edge = self
            .edges
            .get(edge_id)
            .ok_or(TreeError::NotFound(*edge_id))?;
        if edge.claim_id.is_some() {
            return Ok(edge);
        }
        // Timers are irrelevant here.
        self.compute_ancestors_for_edge(&edge, edge.creation_block)?
            .into_iter()
            .map(|ancestor| ancestor.edge)
            .find(|ancestor| ancestor.claim_id.is_some())
            .ok_or(TreeError::NotEssential(*edge_id))
    }

    /// Finds the royal root edge at `reversed` that shares the origin of `cursor`.
    fn royal_root_with_origin(&self, reversed: u8, cursor: &Edge) -> Result<Edge, TreeError> {
        let roots = self
            .royal_root_edges_by_level
            .get(&reversed)
            .ok_or(TreeError::NoHonestEdgesAtLevel(cursor.challenge_level.0))?;
        let root = find_origin_edge(&cursor.origin_id, &roots.to_vec()).ok_or(
            TreeError::NoLevelZeroEdge {
                origin_id: cursor.origin_id,
                level: cursor.challenge_level.0,
            },
        )?;
        Ok(self.current(root))
    }

    /// Walks from `root` down to `query` along the bisection points of each visited edge, and
    /// returns the visited edges, root first, excluding `query`.
    fn walk_within_level(
        &self,
        root: Edge,
        query: &Edge,
        at_block: u64,
    ) -> Result<Vec<Ancestor>, TreeError> {
        let mut path = Vec::new();
        let mut cursor = root;
        loop {
            if cursor.id == query.id {
                return Ok(path);
            }
            let contains_query = cursor.start_height <= query.start_height
                && query.end_height <= cursor.end_height;
            if !contains_query || cursor.length() <= 1 {
                return Err(TreeError::NotFound(query.id));
            }
            path.push(Ancestor {
                local_timer: self.local_timer(&cursor, at_block),
                edge: cursor.clone(),
            });

            let mid = bisect(cursor.start_height, cursor.end_height).map_err(|source| {
                TreeError::Bisection {
                    edge: cursor.id,
                    source,
                }
            })?;
            let next_id = if query.start_height < mid {
                cursor.lower_child_id
            } else {
                cursor.upper_child_id
            }
            .ok_or(TreeError::NotFound(query.id))?;

            // The queried edge may not be tracked yet.
            if next_id == query.id {
                return Ok(path);
            }
            cursor = self
                .edges
                .get(&next_id)
                .ok_or(TreeError::ChildrenNotYetSeen(next_id))?;
        }
    }
}

/// Returns the first edge of `roots` with the given origin.
fn find_origin_edge(origin_id: &OriginId, roots: &[Edge]) -> Option<Edge> {
    roots.iter().find(|root| root.origin_id == *origin_id).cloned()
}
