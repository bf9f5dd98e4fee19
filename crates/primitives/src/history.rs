//! Types describing history commitments and the assertion a challenge is about.

use crate::{AssertionHash, Height};
use ethers::types::{Bytes, H256};
use serde::{Deserialize, Serialize};

/// A commitment to a history of `height + 1` states.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    pub height: Height,
    pub merkle: H256,
}

/// The heights, one per upper challenge level, at which each enclosing dispute was narrowed to a
/// single step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginHeights {
    pub challenge_origin_heights: Vec<Height>,
}

/// The global state of the rollup at an assertion boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    pub block_hash: H256,
    pub send_root: H256,
    pub batch: u64,
    pub pos_in_batch: u64,
}

/// Creation information of an assertion, as read from the assertion chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionCreatedInfo {
    pub parent_assertion_hash: AssertionHash,
    pub before_state: GlobalState,
    pub after_state: GlobalState,
    pub wasm_module_root: H256,
    pub inbox_max_count: u64,
    pub creation_block: u64,
}

/// The [AssociatedAssertionMetadata] struct identifies the execution range a challenge is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedAssertionMetadata {
    pub from_batch: u64,
    pub to_batch: u64,
    pub wasm_module_root: H256,
    pub claimed_assertion_hash: AssertionHash,
}

impl AssociatedAssertionMetadata {
    /// Builds the metadata for the assertion described by `info`.
    pub fn from_creation_info(info: &AssertionCreatedInfo, claimed: AssertionHash) -> Self {
        Self {
            from_batch: info.before_state.batch,
            to_batch: info.after_state.batch,
            wasm_module_root: info.wasm_module_root,
            claimed_assertion_hash: claimed,
        }
    }
}

/// The [HistoryCommitmentRequest] struct asks a state provider for a commitment over a range of
/// its locally computed history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryCommitmentRequest {
    pub assertion_metadata: AssociatedAssertionMetadata,
    pub upper_challenge_origin_heights: Vec<Height>,
    pub from_height: Height,
    /// [None] commits to the full range of the challenge level.
    pub up_to_height: Option<Height>,
}

/// The data needed to resolve a length one, smallest step edge by a one step proof.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneStepData {
    pub before_hash: H256,
    pub after_hash: H256,
    pub proof: Bytes,
}
