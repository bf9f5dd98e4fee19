//! The edge module holds the [Edge] record, the off-chain mirror of a challenge edge.

use crate::{ChallengeLevel, ClaimId, EdgeId, Height, InheritedTimer, MutualId, OriginId};
use ethers::{
    abi::{self, Token},
    types::{H256, U256},
    utils::keccak256,
};
use serde::{Deserialize, Serialize};

/// The on-chain status of an [Edge].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    #[default]
    Pending,
    Confirmed,
}

/// The [Edge] struct is a claim over the sub-range `[start_height, end_height]` of a disputed
/// history at a given [ChallengeLevel].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// The content derived identifier of the edge.
    pub id: EdgeId,
    /// The challenge level the edge belongs to.
    pub challenge_level: ChallengeLevel,
    /// The parent-level dispute this edge's challenge belongs to.
    pub origin_id: OriginId,
    /// The identifier shared by all rivals of this edge.
    pub mutual_id: MutualId,
    pub start_height: Height,
    pub start_commitment: H256,
    pub end_height: Height,
    pub end_commitment: H256,
    /// Only set on level zero edges.
    #[serde(default)]
    pub claim_id: Option<ClaimId>,
    #[serde(default)]
    pub lower_child_id: Option<EdgeId>,
    #[serde(default)]
    pub upper_child_id: Option<EdgeId>,
    /// The block number at which the edge was created on-chain.
    pub creation_block: u64,
    #[serde(default)]
    pub status: EdgeStatus,
    /// The latest inherited timer cached on-chain for this edge.
    #[serde(default)]
    pub cached_inherited_timer: InheritedTimer,
}

impl Edge {
    /// Creates a new pending [Edge], deriving its [MutualId] and [EdgeId] from its contents.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        challenge_level: ChallengeLevel,
        origin_id: OriginId,
        start_height: Height,
        start_commitment: H256,
        end_height: Height,
        end_commitment: H256,
        claim_id: Option<ClaimId>,
        creation_block: u64,
    ) -> Self {
        let mutual_id = Self::compute_mutual_id(
            challenge_level,
            origin_id,
            start_height,
            start_commitment,
            end_height,
        );
        Self {
            id: Self::compute_edge_id(mutual_id, end_commitment),
            challenge_level,
            origin_id,
            mutual_id,
            start_height,
            start_commitment,
            end_height,
            end_commitment,
            claim_id,
            lower_child_id: None,
            upper_child_id: None,
            creation_block,
            status: EdgeStatus::Pending,
            cached_inherited_timer: 0,
        }
    }

    /// Computes the [MutualId] shared by all edges with the same level, origin, start and end
    /// height.
    pub fn compute_mutual_id(
        challenge_level: ChallengeLevel,
        origin_id: OriginId,
        start_height: Height,
        start_commitment: H256,
        end_height: Height,
    ) -> MutualId {
        MutualId(H256::from(keccak256(abi::encode(&[
            Token::Uint(U256::from(challenge_level.0)),
            Token::FixedBytes(origin_id.0.as_bytes().to_vec()),
            Token::Uint(U256::from(start_height)),
            Token::FixedBytes(start_commitment.as_bytes().to_vec()),
            Token::Uint(U256::from(end_height)),
        ]))))
    }

    /// Computes an [EdgeId] from its [MutualId] and end commitment.
    pub fn compute_edge_id(mutual_id: MutualId, end_commitment: H256) -> EdgeId {
        EdgeId(H256::from(keccak256(abi::encode(&[
            Token::FixedBytes(mutual_id.0.as_bytes().to_vec()),
            Token::FixedBytes(end_commitment.as_bytes().to_vec()),
        ]))))
    }

    /// Level zero edges span the entire range of their level and carry a claim.
    pub fn is_level_zero(&self) -> bool {
        self.claim_id.is_some()
    }

    pub fn length(&self) -> u64 {
        self.end_height.saturating_sub(self.start_height)
    }

    pub fn has_length_one(&self) -> bool {
        self.length() == 1
    }

    pub fn has_children(&self) -> bool {
        self.lower_child_id.is_some() && self.upper_child_id.is_some()
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == EdgeStatus::Confirmed
    }

    /// A proof edge is a length one edge at the deepest challenge level, resolved by a one step
    /// proof.
    pub fn is_proof_edge(&self, total_challenge_levels: u8) -> bool {
        self.challenge_level.is_smallest_step(total_challenge_levels) && self.has_length_one()
    }
}

#[cfg(test)]
mod test {
    use super::{Edge, EdgeStatus};
    use crate::{ChallengeLevel, OriginId};
    use ethers::types::H256;

    fn commit(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    #[test]
    fn rivals_share_mutual_id_only() {
        let honest = Edge::new(ChallengeLevel(0), OriginId::default(), 0, commit(1), 16, commit(2), None, 1);
        let evil = Edge::new(ChallengeLevel(0), OriginId::default(), 0, commit(1), 16, commit(3), None, 2);
        assert_eq!(honest.mutual_id, evil.mutual_id);
        assert_ne!(honest.id, evil.id);

        let other_origin =
            Edge::new(ChallengeLevel(0), OriginId(commit(9)), 0, commit(1), 16, commit(2), None, 1);
        assert_ne!(honest.mutual_id, other_origin.mutual_id);
        let other_level = Edge::new(ChallengeLevel(1), OriginId::default(), 0, commit(1), 16, commit(2), None, 1);
        assert_ne!(honest.id, other_level.id);
    }

    #[test]
    fn range_helpers() {
        let mut edge = Edge::new(ChallengeLevel(2), OriginId::default(), 3, commit(1), 4, commit(2), None, 1);
        assert!(edge.has_length_one());
        assert!(edge.is_proof_edge(3));
        assert!(!edge.is_proof_edge(4));
        assert!(!edge.has_children());
        assert!(!edge.is_level_zero());
        edge.status = EdgeStatus::Confirmed;
        assert!(edge.is_confirmed());
    }

    #[test]
    fn deserializes_with_defaults() {
        let edge = Edge::new(ChallengeLevel(0), OriginId::default(), 0, commit(1), 8, commit(2), None, 5);
        let mut json = serde_json::to_value(&edge).unwrap();
        let obj = json.as_object_mut().unwrap();
        obj.remove("status");
        obj.remove("lower_child_id");
        obj.remove("cached_inherited_timer");
        let decoded: Edge = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, edge);
    }
}
