//! JSON challenge snapshots, and the in-memory collaborators they are replayed through.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bold_challenger_primitives::{
    AssertionCreatedInfo, AssertionHash, ChallengeLevel, ClaimId, Edge, EdgeId, EdgeStatus,
    Height, History, HistoryChecker, HistoryCommitmentRequest, MetadataReader, OriginHeights,
    OriginId,
};
use bold_challenger_tree::RoyalChallengeTree;
use ethers::types::H256;
use serde::Deserialize;
use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::Arc,
};

/// The [Snapshot] struct is a recorded challenge: every edge observed on-chain, plus the
/// commitments of the honest history.
#[derive(Debug, Clone, Deserialize)]
pub struct Snapshot {
    pub assertion_hash: AssertionHash,
    pub total_challenge_levels: u8,
    /// The number of blocks the challenged assertion was unrivaled for.
    #[serde(default)]
    pub unrivaled_blocks: u64,
    pub challenge_period: u64,
    pub edges: Vec<SnapshotEdge>,
    /// Every end commitment the local history agrees with.
    pub honest_commitments: HashSet<H256>,
}

/// An edge of a [Snapshot]. Edges refer to each other by name.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotEdge {
    pub name: String,
    pub level: u8,
    pub start_height: Height,
    pub start_commitment: H256,
    pub end_height: Height,
    pub end_commitment: H256,
    pub creation_block: u64,
    /// The assertion claimed by a block challenge level zero edge.
    #[serde(default)]
    pub claim_assertion: Option<AssertionHash>,
    /// The edge claimed by a subchallenge level zero edge. Must be listed earlier.
    #[serde(default)]
    pub claims: Option<String>,
    /// The edge whose mutual id is the origin of this edge's challenge. Must be listed earlier.
    #[serde(default)]
    pub origin: Option<String>,
    /// The lower and upper children, if the edge was bisected.
    #[serde(default)]
    pub children: Option<(String, String)>,
    #[serde(default)]
    pub confirmed: bool,
}

/// The [Replay] struct is the challenge tree built from a [Snapshot], with the snapshot names of
/// its edges.
pub struct Replay {
    pub tree: RoyalChallengeTree,
    names: HashMap<EdgeId, String>,
}

impl Replay {
    /// The snapshot name of `edge_id`, or its short id if it was not part of the snapshot.
    pub fn name(&self, edge_id: &EdgeId) -> String {
        self.names
            .get(edge_id)
            .cloned()
            .unwrap_or_else(|| edge_id.short())
    }
}

impl Snapshot {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("could not read snapshot at {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("could not parse snapshot at {}", path.display()))
    }

    /// Builds every edge of the snapshot, in listing order.
    pub fn build_edges(&self) -> Result<Vec<(String, Edge)>> {
        let mut by_name: HashMap<&str, Edge> = HashMap::with_capacity(self.edges.len());
        let mut built = Vec::with_capacity(self.edges.len());
        for entry in &self.edges {
            let origin_id = match &entry.origin {
                Some(name) => OriginId::from(lookup(&by_name, name)?.mutual_id),
                None => OriginId::default(),
            };
            let claim_id = match (&entry.claims, entry.claim_assertion) {
                (Some(_), Some(_)) => {
                    bail!("edge {} claims both an edge and an assertion", entry.name)
                }
                (Some(name), None) => Some(ClaimId::from(lookup(&by_name, name)?.id)),
                (None, Some(assertion_hash)) => Some(ClaimId::from(assertion_hash)),
                (None, None) => None,
            };
            let mut edge = Edge::new(
                ChallengeLevel(entry.level),
                origin_id,
                entry.start_height,
                entry.start_commitment,
                entry.end_height,
                entry.end_commitment,
                claim_id,
                entry.creation_block,
            );
            if entry.confirmed {
                edge.status = EdgeStatus::Confirmed;
            }
            if by_name.insert(entry.name.as_str(), edge.clone()).is_some() {
                bail!("duplicate edge name {}", entry.name);
            }
            built.push((entry.name.clone(), edge));
        }

        for (entry, (_, edge)) in self.edges.iter().zip(built.iter_mut()) {
            if let Some((lower, upper)) = &entry.children {
                edge.lower_child_id = Some(lookup(&by_name, lower)?.id);
                edge.upper_child_id = Some(lookup(&by_name, upper)?.id);
            }
        }
        Ok(built)
    }

    /// Feeds every edge of the snapshot into a fresh [RoyalChallengeTree], in creation order.
    /// Edges that cannot be classified are logged and skipped.
    pub async fn replay(&self, validator_name: &str) -> Result<Replay> {
        let tree = RoyalChallengeTree::new(
            self.assertion_hash,
            Arc::new(SnapshotReader {
                assertion_hash: self.assertion_hash,
                unrivaled_blocks: self.unrivaled_blocks,
            }),
            Arc::new(SnapshotHistory {
                honest_commitments: self.honest_commitments.clone(),
            }),
            self.total_challenge_levels,
            validator_name,
        );

        let mut edges = self.build_edges()?;
        edges.sort_by_key(|(_, edge)| edge.creation_block);
        let mut names = HashMap::with_capacity(edges.len());
        for (name, edge) in edges {
            names.insert(edge.id, name.clone());
            match tree.add_edge(edge).await {
                Ok(royal) => {
                    tracing::debug!(target: "bold-challenger-cli", "Observed edge {name}, royal={royal}")
                }
                Err(err) => {
                    tracing::warn!(target: "bold-challenger-cli", "Could not add edge {name}: {err:#}")
                }
            }
        }
        Ok(Replay { tree, names })
    }
}

fn lookup<'a>(edges: &'a HashMap<&str, Edge>, name: &str) -> Result<&'a Edge> {
    edges
        .get(name)
        .ok_or_else(|| anyhow!("edge {name} is referenced before it is listed"))
}

/// Serves the assertion metadata recorded in a [Snapshot].
struct SnapshotReader {
    assertion_hash: AssertionHash,
    unrivaled_blocks: u64,
}

#[async_trait]
impl MetadataReader for SnapshotReader {
    async fn top_level_assertion(&self, _edge_id: EdgeId) -> Result<AssertionHash> {
        Ok(self.assertion_hash)
    }

    async fn assertion_unrivaled_blocks(&self, _assertion_hash: AssertionHash) -> Result<u64> {
        Ok(self.unrivaled_blocks)
    }

    async fn top_level_claim_heights(&self, _edge_id: EdgeId) -> Result<OriginHeights> {
        Ok(OriginHeights::default())
    }

    async fn read_assertion_creation_info(
        &self,
        _assertion_hash: AssertionHash,
    ) -> Result<AssertionCreatedInfo> {
        Ok(AssertionCreatedInfo::default())
    }
}

/// Agrees with exactly the honest commitments recorded in a [Snapshot].
struct SnapshotHistory {
    honest_commitments: HashSet<H256>,
}

#[async_trait]
impl HistoryChecker for SnapshotHistory {
    async fn agrees_with_history_commitment(
        &self,
        _challenge_level: ChallengeLevel,
        _request: &HistoryCommitmentRequest,
        commitment: &History,
    ) -> Result<bool> {
        Ok(self.honest_commitments.contains(&commitment.merkle))
    }
}
