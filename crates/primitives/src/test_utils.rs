//! Fixtures for tests: edges built from compact names and in-memory collaborators.
//!
//! Edge names follow the pattern `{level}-{start}.{tag}-{end}.{tag}`, for example `blk-0.a-16.a`
//! or `big-2.a-3.b`. The level prefix is one of `blk`, `big` or `smol` and every commitment is
//! derived from its height and tag, so `blk-0.a-16.a` and `blk-0.a-16.b` are rivals. The honest
//! history always uses the tag `a`.

use crate::{
    AssertionCreatedInfo, AssertionHash, ChallengeLevel, ClaimId, Edge, HistoryChecker, Height,
    History, HistoryCommitmentRequest, MetadataReader, OriginHeights, OriginId, ProtocolError,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::{types::H256, utils::keccak256};
use parking_lot::Mutex;

/// The tag of the honest history.
pub const HONEST_TAG: &str = "a";

/// The commitment to the history tagged `tag` at `height`.
pub fn commitment(height: Height, tag: &str) -> H256 {
    H256::from(keccak256(format!("{height}.{tag}")))
}

/// The hash of the assertion named `name`, e.g. `assertion.a`.
pub fn assertion_hash(name: &str) -> AssertionHash {
    AssertionHash(H256::from(keccak256(name)))
}

fn parse_point(point: &str) -> (Height, String) {
    let (height, tag) = point
        .split_once('.')
        .unwrap_or_else(|| panic!("malformed edge point {point}"));
    let height = height
        .parse()
        .unwrap_or_else(|_| panic!("malformed edge height {height}"));
    (height, tag.to_string())
}

/// The [EdgeBuilder] struct builds an [Edge] from its compact name.
#[derive(Debug, Clone)]
pub struct EdgeBuilder {
    name: String,
    origin_id: OriginId,
    claim_id: Option<ClaimId>,
    creation_block: u64,
}

impl EdgeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            origin_id: OriginId::default(),
            claim_id: None,
            creation_block: 0,
        }
    }

    pub fn origin(mut self, origin_id: OriginId) -> Self {
        self.origin_id = origin_id;
        self
    }

    pub fn claim(mut self, claim_id: impl Into<ClaimId>) -> Self {
        self.claim_id = Some(claim_id.into());
        self
    }

    pub fn created_at(mut self, block: u64) -> Self {
        self.creation_block = block;
        self
    }

    pub fn build(self) -> Edge {
        let mut parts = self.name.split('-');
        let level = match parts.next() {
            Some("blk") => ChallengeLevel(0),
            Some("big") => ChallengeLevel(1),
            Some("smol") => ChallengeLevel(2),
            other => panic!("unknown challenge level prefix {other:?}"),
        };
        let (start_height, start_tag) = parse_point(parts.next().expect("missing start point"));
        let (end_height, end_tag) = parse_point(parts.next().expect("missing end point"));
        Edge::new(
            level,
            self.origin_id,
            start_height,
            commitment(start_height, &start_tag),
            end_height,
            commitment(end_height, &end_tag),
            self.claim_id,
            self.creation_block,
        )
    }
}

/// Shorthand for an unclaimed edge with a zero origin created at `block`.
pub fn edge(name: &str, block: u64) -> Edge {
    EdgeBuilder::new(name).created_at(block).build()
}

/// Links `lower` and `upper` as the children of `parent`.
pub fn link(parent: &mut Edge, lower: &Edge, upper: &Edge) {
    parent.lower_child_id = Some(lower.id);
    parent.upper_child_id = Some(upper.id);
}

/// The [MockMetadataReader] struct serves fixed metadata, optionally failing selected calls.
#[derive(Debug, Default)]
pub struct MockMetadataReader {
    pub assertion_hash: AssertionHash,
    pub unrivaled_blocks: u64,
    pub claim_heights: OriginHeights,
    pub creation_info: AssertionCreatedInfo,
    pub fail_top_level_assertion: bool,
    pub fail_claim_heights: bool,
}

impl MockMetadataReader {
    pub fn new(assertion_hash: AssertionHash, unrivaled_blocks: u64) -> Self {
        Self {
            assertion_hash,
            unrivaled_blocks,
            ..Default::default()
        }
    }
}

#[async_trait]
impl MetadataReader for MockMetadataReader {
    async fn top_level_assertion(&self, _edge_id: crate::EdgeId) -> Result<AssertionHash> {
        if self.fail_top_level_assertion {
            return Err(anyhow!("bad request"));
        }
        Ok(self.assertion_hash)
    }

    async fn assertion_unrivaled_blocks(&self, _assertion_hash: AssertionHash) -> Result<u64> {
        Ok(self.unrivaled_blocks)
    }

    async fn top_level_claim_heights(&self, _edge_id: crate::EdgeId) -> Result<OriginHeights> {
        if self.fail_claim_heights {
            return Err(anyhow!("bad request"));
        }
        Ok(self.claim_heights.clone())
    }

    async fn read_assertion_creation_info(
        &self,
        _assertion_hash: AssertionHash,
    ) -> Result<AssertionCreatedInfo> {
        Ok(self.creation_info.clone())
    }
}

/// The [MockHistoryChecker] struct agrees with every commitment made to the history tagged
/// [HONEST_TAG], along with any `also_agrees` tags, and records the requests it receives.
#[derive(Debug, Default)]
pub struct MockHistoryChecker {
    pub syncing: bool,
    pub fail: bool,
    pub also_agrees: Vec<String>,
    pub requests: Mutex<Vec<(ChallengeLevel, HistoryCommitmentRequest, History)>>,
}

impl MockHistoryChecker {
    pub fn syncing() -> Self {
        Self {
            syncing: true,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// A checker that also agrees with the histories tagged `tags`.
    pub fn agreeing_with(tags: &[&str]) -> Self {
        Self {
            also_agrees: tags.iter().map(|tag| tag.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl HistoryChecker for MockHistoryChecker {
    async fn agrees_with_history_commitment(
        &self,
        challenge_level: ChallengeLevel,
        request: &HistoryCommitmentRequest,
        commitment_to_check: &History,
    ) -> Result<bool> {
        if self.syncing {
            return Err(ProtocolError::ChainCatchingUp.into());
        }
        if self.fail {
            return Err(anyhow!("bad request"));
        }
        self.requests
            .lock()
            .push((challenge_level, request.clone(), commitment_to_check.clone()));
        let height = commitment_to_check.height;
        Ok(std::iter::once(HONEST_TAG)
            .chain(self.also_agrees.iter().map(String::as_str))
            .any(|tag| commitment(height, tag) == commitment_to_check.merkle))
    }
}
