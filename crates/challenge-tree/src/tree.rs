//! The tree module holds the [RoyalChallengeTree], the local record of the honest edges of a
//! single challenge across all of its challenge levels.

use crate::TreeError;
use anyhow::{Context, Result};
use bold_challenger_primitives::{
    containers::{ThreadSafeMap, ThreadSafeSlice},
    is_chain_catching_up, AssertionHash, AssociatedAssertionMetadata, ChallengeLevel, ClaimId,
    Edge, EdgeId, EdgeStatus, HistoryChecker, History, HistoryCommitmentRequest, InheritedTimer,
    MetadataReader, MutualId, OriginId,
};
use std::sync::Arc;

/// Rivals are keyed by origin as well as mutual id, so identical ranges in different
/// subchallenges never count as rivals of each other.
pub(crate) type RivalKey = (OriginId, MutualId);

/// The [RoyalChallengeTree] struct tracks the royal (honest) edges of a challenge on a single
/// top level assertion, along with the creation time of every observed edge, royal or not.
///
/// Every collection is append-only for the lifetime of the tree, so concurrent readers may miss
/// the latest insert but never observe a reverted one.
pub struct RoyalChallengeTree {
    /// Royal edges by id.
    pub(crate) edges: ThreadSafeMap<EdgeId, Edge>,
    /// Creation blocks of every observed edge, grouped by rival key.
    pub(crate) rival_creation_times: ThreadSafeMap<RivalKey, ThreadSafeMap<EdgeId, u64>>,
    /// Royal level zero edges, keyed by reversed challenge level.
    pub(crate) royal_root_edges_by_level: ThreadSafeMap<u8, ThreadSafeSlice<Edge>>,
    top_level_assertion_hash: AssertionHash,
    total_challenge_levels: u8,
    pub(crate) metadata_reader: Arc<dyn MetadataReader>,
    history_checker: Arc<dyn HistoryChecker>,
    validator_name: String,
}

impl RoyalChallengeTree {
    /// Creates a new, empty [RoyalChallengeTree] for the challenge on `top_level_assertion_hash`.
    pub fn new(
        top_level_assertion_hash: AssertionHash,
        metadata_reader: Arc<dyn MetadataReader>,
        history_checker: Arc<dyn HistoryChecker>,
        total_challenge_levels: u8,
        validator_name: impl Into<String>,
    ) -> Self {
        Self {
            edges: ThreadSafeMap::new(),
            rival_creation_times: ThreadSafeMap::new(),
            royal_root_edges_by_level: ThreadSafeMap::new(),
            top_level_assertion_hash,
            total_challenge_levels,
            metadata_reader,
            history_checker,
            validator_name: validator_name.into(),
        }
    }

    pub fn top_level_assertion_hash(&self) -> AssertionHash {
        self.top_level_assertion_hash
    }

    pub fn total_challenge_levels(&self) -> u8 {
        self.total_challenge_levels
    }

    /// Returns the current copy of the royal edge `edge_id`, if tracked.
    pub fn get_edge(&self, edge_id: &EdgeId) -> Option<Edge> {
        self.edges.get(edge_id)
    }

    pub fn has_royal_edge(&self, edge_id: &EdgeId) -> bool {
        self.edges.has(edge_id)
    }

    /// Returns a snapshot of every royal edge.
    pub fn royal_edges(&self) -> Vec<Edge> {
        self.edges.values()
    }

    /// Returns the royal level zero edges at the given challenge level, in insertion order.
    pub fn royal_root_edges(&self, challenge_level: ChallengeLevel) -> Result<Vec<Edge>, TreeError> {
        let reversed = self.reversed_level(challenge_level)?;
        Ok(self
            .royal_root_edges_by_level
            .get(&reversed)
            .map(|roots| roots.to_vec())
            .unwrap_or_default())
    }

    pub(crate) fn reversed_level(&self, level: ChallengeLevel) -> Result<u8, TreeError> {
        level
            .reversed(self.total_challenge_levels)
            .ok_or(TreeError::InvalidChallengeLevel {
                level: level.0,
                total: self.total_challenge_levels,
            })
    }

    /// Registers an edge already known to be royal, such as one created by this validator.
    /// Adding an edge that is already tracked is a no-op.
    pub fn add_royal_edge(&self, edge: Edge) -> Result<(), TreeError> {
        let reversed = self.reversed_level(edge.challenge_level)?;
        if self.edges.has(&edge.id) {
            return Ok(());
        }
        self.record_creation_time(&edge);
        if edge.is_level_zero() {
            self.insert_royal_root(&edge, reversed);
        }
        tracing::debug!(
            target: "challenge-tree",
            "Tracking verified royal edge {} at {}, validator={}",
            edge.id.short(),
            edge.challenge_level,
            self.validator_name
        );
        self.edges.insert_if_absent(edge.id, edge);
        Ok(())
    }

    /// Classifies an observed edge, tracking it if it is royal.
    ///
    /// An edge is royal if it has an honest ancestry and the local history agrees with its end
    /// commitment. Every edge passed in has its creation time recorded as a potential rival,
    /// royal or not.
    ///
    /// ### Takes
    /// - `edge`: The observed edge.
    ///
    /// ### Returns
    /// - `Ok(bool)`: Whether the edge is royal.
    /// - `Err(anyhow::Error)`: The edge could not be classified. Wraps
    ///   [TreeError::AlreadyBeingTracked], [TreeError::MismatchedChallengeAssertionHash] or
    ///   [TreeError::StillSyncing] for the distinguished failures.
    pub async fn add_edge(&self, edge: Edge) -> Result<bool> {
        if self.edges.has(&edge.id) {
            return Err(TreeError::AlreadyBeingTracked(edge.id).into());
        }
        let reversed = self.reversed_level(edge.challenge_level)?;

        let assertion_hash = self
            .metadata_reader
            .top_level_assertion(edge.id)
            .await
            .with_context(|| format!("could not get top level assertion for edge {}", edge.id))?;
        if assertion_hash != self.top_level_assertion_hash {
            return Err(TreeError::MismatchedChallengeAssertionHash {
                got: assertion_hash,
                expected: self.top_level_assertion_hash,
            }
            .into());
        }

        self.record_creation_time(&edge);

        if !self.has_honest_ancestry(&edge)? {
            tracing::trace!(
                target: "challenge-tree",
                "Edge {} at {} has no honest ancestry",
                edge.id.short(),
                edge.challenge_level
            );
            return Ok(false);
        }

        let claimed_assertion_hash = match edge.claim_id {
            Some(claim_id) if edge.challenge_level.is_block_level() => AssertionHash::from(claim_id),
            _ => {
                let root = self.block_challenge_root_edge()?;
                root.claim_id
                    .map(AssertionHash::from)
                    .ok_or(TreeError::NoClaim(root.id))?
            }
        };

        let heights = self
            .metadata_reader
            .top_level_claim_heights(edge.id)
            .await
            .with_context(|| format!("could not get claim heights for edge {}", edge.id))?;
        let creation_info = self
            .metadata_reader
            .read_assertion_creation_info(claimed_assertion_hash)
            .await
            .with_context(|| {
                format!("could not read assertion creation info for {claimed_assertion_hash}")
            })?;
        let request = HistoryCommitmentRequest {
            assertion_metadata: AssociatedAssertionMetadata::from_creation_info(
                &creation_info,
                claimed_assertion_hash,
            ),
            upper_challenge_origin_heights: heights.challenge_origin_heights,
            from_height: 0,
            up_to_height: Some(edge.end_height),
        };
        let end_history = History {
            height: edge.end_height,
            merkle: edge.end_commitment,
        };
        let agrees = match self
            .history_checker
            .agrees_with_history_commitment(edge.challenge_level, &request, &end_history)
            .await
        {
            Ok(agrees) => agrees,
            Err(err) if is_chain_catching_up(&err) => {
                return Err(TreeError::StillSyncing(format!("{err:#}")).into());
            }
            Err(err) => return Err(err.context("could not check history commitment agreement")),
        };
        if !agrees {
            return Ok(false);
        }

        let key = (edge.origin_id, edge.mutual_id);
        if let Some(royal_rival) = self.royal_rival(&key, &edge.id) {
            tracing::warn!(
                target: "challenge-tree",
                "Edge {} agrees with local history but its rival {} is already royal",
                edge.id.short(),
                royal_rival.short()
            );
            return Ok(false);
        }

        if edge.is_level_zero() {
            self.insert_royal_root(&edge, reversed);
        }
        tracing::debug!(
            target: "challenge-tree",
            "Tracking royal edge {} at {} [{}, {}], validator={}",
            edge.id.short(),
            edge.challenge_level,
            edge.start_height,
            edge.end_height,
            self.validator_name
        );
        self.edges.insert_if_absent(edge.id, edge);
        Ok(true)
    }

    /// An edge has an honest ancestry if it is a block level edge claiming an assertion, a
    /// subchallenge level zero edge claiming a royal edge, or if its ancestors can be walked
    /// back to a royal level zero edge.
    fn has_honest_ancestry(&self, edge: &Edge) -> Result<bool, TreeError> {
        if let Some(claim_id) = edge.claim_id {
            if edge.challenge_level.is_block_level() {
                return Ok(true);
            }
            return Ok(self.edges.has(&EdgeId::from(claim_id)));
        }
        match self.compute_ancestors_for_edge(edge, edge.creation_block) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_yet_available() => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn royal_rival(&self, key: &RivalKey, edge_id: &EdgeId) -> Option<EdgeId> {
        let rivals = self.rival_creation_times.get(key)?;
        let mut royal = None;
        rivals.for_each(|id, _| {
            if id != edge_id && royal.is_none() && self.edges.has(id) {
                royal = Some(*id);
            }
        });
        royal
    }

    /// Records the creation block of `edge` under its rival key. Existing entries are never
    /// overwritten.
    pub(crate) fn record_creation_time(&self, edge: &Edge) {
        self.rival_creation_times
            .get_or_insert_with((edge.origin_id, edge.mutual_id), ThreadSafeMap::new)
            .insert_if_absent(edge.id, edge.creation_block);
    }

    fn insert_royal_root(&self, edge: &Edge, reversed: u8) {
        self.royal_root_edges_by_level
            .get_or_insert_with(reversed, ThreadSafeSlice::new)
            .push_unless(edge.clone(), |root| root.id == edge.id);
    }

    /// Links the children of a tracked edge once a bisection of it has been observed.
    pub fn update_edge_children(
        &self,
        edge_id: &EdgeId,
        lower_child_id: EdgeId,
        upper_child_id: EdgeId,
    ) -> Result<(), TreeError> {
        let updated = self.edges.update(edge_id, |edge| {
            edge.lower_child_id = Some(lower_child_id);
            edge.upper_child_id = Some(upper_child_id);
        });
        if !updated {
            return Err(TreeError::NotFound(*edge_id));
        }
        Ok(())
    }

    /// Transitions a tracked edge to [EdgeStatus::Confirmed].
    pub fn mark_edge_confirmed(&self, edge_id: &EdgeId) -> Result<(), TreeError> {
        if !self.edges.update(edge_id, |edge| edge.status = EdgeStatus::Confirmed) {
            return Err(TreeError::NotFound(*edge_id));
        }
        Ok(())
    }

    /// Records the latest on-chain inherited timer of a tracked edge. Timers only ever grow, so
    /// a smaller value than the one recorded is ignored.
    pub fn update_cached_inherited_timer(
        &self,
        edge_id: &EdgeId,
        timer: InheritedTimer,
    ) -> Result<(), TreeError> {
        let updated = self.edges.update(edge_id, |edge| {
            edge.cached_inherited_timer = edge.cached_inherited_timer.max(timer)
        });
        if !updated {
            return Err(TreeError::NotFound(*edge_id));
        }
        Ok(())
    }

    /// Returns the royal level zero edge of the block challenge.
    pub fn block_challenge_root_edge(&self) -> Result<Edge, TreeError> {
        let roots = self.royal_root_edges(ChallengeLevel::BLOCK)?;
        let root = roots.into_iter().next().ok_or(TreeError::NoHonestTopLevelEdge)?;
        Ok(self.current(root))
    }

    /// Returns the latest tracked copy of `edge`, which may have been updated since the given
    /// snapshot was taken.
    pub(crate) fn current(&self, edge: Edge) -> Edge {
        self.edges.get(&edge.id).unwrap_or(edge)
    }

    /// Finds the royal level zero edge at the next challenge level that claims `claimed`.
    pub(crate) fn find_claiming_edge(&self, claimed: &Edge) -> Option<Edge> {
        let reversed = self.reversed_level(claimed.challenge_level).ok()?;
        let next_level = reversed.checked_sub(1)?;
        let claim_id = ClaimId::from(claimed.id);
        self.royal_root_edges_by_level
            .get(&next_level)?
            .find(|root| root.claim_id == Some(claim_id))
            .map(|root| self.current(root))
    }

    /// Returns the deepest royal edges across all challenge levels: edges without children that
    /// no royal edge at a deeper level claims.
    pub fn lower_most_royal_edges(&self) -> Vec<Edge> {
        let mut leaves = self
            .edges
            .values()
            .into_iter()
            .filter(|edge| !edge.has_children() && self.find_claiming_edge(edge).is_none())
            .collect::<Vec<_>>();
        leaves.sort_by(|a, b| {
            b.challenge_level
                .cmp(&a.challenge_level)
                .then(a.start_height.cmp(&b.start_height))
                .then(a.id.cmp(&b.id))
        });
        leaves
    }

    /// Returns a confirmed royal edge whose claim id is `claim_id`, if one exists.
    pub fn confirmed_edge_with_claim_exists(&self, claim_id: ClaimId) -> Option<EdgeId> {
        self.edges
            .find(|_, edge| edge.is_confirmed() && edge.claim_id == Some(claim_id))
            .map(|edge| edge.id)
    }
}
