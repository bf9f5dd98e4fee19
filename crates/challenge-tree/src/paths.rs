//! Essential paths and path weights.
//!
//! An edge is essential if it carries a claim id. Its essential paths run from it down every
//! branch of its bisections, and across levels through the edges claiming its length one
//! descendants, until a leaf is reached. An essential edge is only as strong as its weakest
//! path.

use crate::{RoyalChallengeTree, TreeError};
use bold_challenger_primitives::{Edge, EdgeId};

/// The [EssentialPath] struct is one path from a leaf up to an essential edge, with the local
/// timer of each edge on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EssentialPath {
    /// Edge ids ordered from the leaf to the essential edge.
    pub edges: Vec<EdgeId>,
    /// The local timer of each edge in `edges`.
    pub local_timers: Vec<u64>,
}

impl EssentialPath {
    /// The saturating sum of the path's local timers.
    pub fn weight(&self) -> u64 {
        saturating_sum(self.local_timers.iter().copied())
    }
}

/// The [Confirmability] struct is the result of checking an essential edge against a
/// confirmation threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmability {
    /// Whether every essential path weighs at least the threshold.
    pub confirmable: bool,
    pub paths: Vec<EssentialPath>,
    /// The weight of the lightest path.
    pub min_weight: u64,
}

pub(crate) fn saturating_sum(timers: impl IntoIterator<Item = u64>) -> u64 {
    timers
        .into_iter()
        .fold(0u64, |acc, timer| acc.saturating_add(timer))
}

struct Visited {
    edge: Edge,
    path: Vec<EdgeId>,
    local_timers: Vec<u64>,
}

impl RoyalChallengeTree {
    /// Checks whether the essential edge `essential_edge_id` is confirmable at `at_block`: the
    /// lightest of its essential paths must weigh at least `confirmation_threshold`.
    ///
    /// ### Returns
    /// - `Ok(Confirmability)`: The verdict, every essential path found and the minimum weight.
    /// - `Err(TreeError::NotFound)`: The edge is not tracked.
    /// - `Err(TreeError::NotEssential)`: The edge has no claim id.
    /// - `Err(TreeError::ChildrenNotYetSeen)`: A child of an edge on the paths is not tracked.
    pub fn is_confirmable_essential_edge(
        &self,
        essential_edge_id: &EdgeId,
        confirmation_threshold: u64,
        at_block: u64,
    ) -> Result<Confirmability, TreeError> {
        let essential = self
            .edges
            .get(essential_edge_id)
            .ok_or(TreeError::NotFound(*essential_edge_id))?;
        if essential.claim_id.is_none() {
            return Err(TreeError::NotEssential(*essential_edge_id));
        }
        let paths = self.find_essential_paths(essential, at_block)?;
        let min_weight = paths
            .iter()
            .map(EssentialPath::weight)
            .min()
            .ok_or(TreeError::NoEssentialPaths(*essential_edge_id))?;
        Ok(Confirmability {
            confirmable: min_weight >= confirmation_threshold,
            paths,
            min_weight,
        })
    }

    /// Runs [RoyalChallengeTree::is_confirmable_essential_edge] on the closest essential
    /// ancestor of `edge_id`.
    pub fn is_essential_ancestor_confirmable(
        &self,
        edge_id: &EdgeId,
        confirmation_threshold: u64,
        at_block: u64,
    ) -> Result<bool, TreeError> {
        let essential = self.closest_essential_ancestor(edge_id)?;
        Ok(self
            .is_confirmable_essential_edge(&essential.id, confirmation_threshold, at_block)?
            .confirmable)
    }

    /// Depth first search for the essential paths below `essential`, using an explicit stack.
    fn find_essential_paths(
        &self,
        essential: Edge,
        at_block: u64,
    ) -> Result<Vec<EssentialPath>, TreeError> {
        let mut paths = Vec::new();
        let mut stack = vec![Visited {
            local_timers: vec![self.local_timer(&essential, at_block)],
            path: vec![essential.id],
            edge: essential,
        }];

        while let Some(Visited {
            edge,
            mut path,
            mut local_timers,
        }) = stack.pop()
        {
            if let (Some(lower_id), Some(upper_id)) = (edge.lower_child_id, edge.upper_child_id) {
                for child_id in [lower_id, upper_id] {
                    let child = self
                        .edges
                        .get(&child_id)
                        .ok_or(TreeError::ChildrenNotYetSeen(child_id))?;
                    let mut child_path = path.clone();
                    child_path.push(child_id);
                    let mut child_timers = local_timers.clone();
                    child_timers.push(self.local_timer(&child, at_block));
                    stack.push(Visited {
                        edge: child,
                        path: child_path,
                        local_timers: child_timers,
                    });
                }
                continue;
            }
            if let Some(claiming) = self.claiming_edge_of(&edge) {
                path.push(claiming.id);
                local_timers.push(self.local_timer(&claiming, at_block));
                stack.push(Visited {
                    edge: claiming,
                    path,
                    local_timers,
                });
                continue;
            }
            path.reverse();
            local_timers.reverse();
            paths.push(EssentialPath {
                edges: path,
                local_timers,
            });
        }
        Ok(paths)
    }

    /// Returns the royal edge claiming `edge` if it is a length one edge disputed at the next
    /// challenge level. Proof edges are never claimed.
    fn claiming_edge_of(&self, edge: &Edge) -> Option<Edge> {
        if edge.is_proof_edge(self.total_challenge_levels()) || !edge.has_length_one() {
            return None;
        }
        self.find_claiming_edge(edge)
    }

    /// Computes the weight of the path from `child` up to its ancestor `ancestor`: the
    /// saturating sum of the local timers of both and of every edge between them.
    ///
    /// ### Returns
    /// - `Err(TreeError::NotFound)`: `child` is not tracked.
    /// - `Err(TreeError::AncestorNotTracked)`: `ancestor` is not tracked.
    /// - `Err(TreeError::NotAnAncestor)`: `ancestor` is not on the ancestor chain of `child`.
    pub fn compute_path_weight(
        &self,
        child_id: &EdgeId,
        ancestor_id: &EdgeId,
        at_block: u64,
    ) -> Result<u64, TreeError> {
        let child = self
            .edges
            .get(child_id)
            .ok_or(TreeError::NotFound(*child_id))?;
        if !self.edges.has(ancestor_id) {
            return Err(TreeError::AncestorNotTracked(*ancestor_id));
        }
        let local_timer = self.local_timer(&child, at_block);
        if child_id == ancestor_id {
            return Ok(local_timer);
        }

        let mut weight = local_timer;
        for ancestor in self.compute_ancestors_for_edge(&child, at_block)? {
            weight = weight.saturating_add(ancestor.local_timer);
            if ancestor.edge.id == *ancestor_id {
                return Ok(weight);
            }
        }
        Err(TreeError::NotAnAncestor {
            child: *child_id,
            ancestor: *ancestor_id,
        })
    }
}
