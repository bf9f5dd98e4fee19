//! The errors module holds the [TreeError] enum returned by challenge tree computations.

use bold_challenger_primitives::{
    bisection::BisectionError, AssertionHash, EdgeId, OriginId,
};
use thiserror::Error;

/// The [TreeError] enum contains every failure of the royal challenge tree's computations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("edge {0} already being tracked")]
    AlreadyBeingTracked(EdgeId),
    #[error("edge challenged assertion hash {got} does not match tree assertion hash {expected}")]
    MismatchedChallengeAssertionHash {
        got: AssertionHash,
        expected: AssertionHash,
    },
    #[error("not found in honest challenge tree: id={0}")]
    NotFound(EdgeId),
    #[error("no honest edges found at challenge level {0}")]
    NoHonestEdgesAtLevel(u8),
    #[error("no level zero edge with origin id {origin_id} found at challenge level {level}")]
    NoLevelZeroEdge { origin_id: OriginId, level: u8 },
    #[error("no honest block challenge edge being tracked")]
    NoHonestTopLevelEdge,
    #[error("edge {0} does not claim any edge")]
    NoClaim(EdgeId),
    #[error("claimed edge {0} not found")]
    ClaimedEdgeNotFound(EdgeId),
    #[error("child not yet tracked: {0}")]
    ChildrenNotYetSeen(EdgeId),
    #[error("ancestor not yet tracked: {0}")]
    AncestorNotTracked(EdgeId),
    #[error("expected ancestor {ancestor} not found in computed ancestors of {child}")]
    NotAnAncestor { child: EdgeId, ancestor: EdgeId },
    #[error("edge {0} is not essential")]
    NotEssential(EdgeId),
    #[error("no essential paths found from edge {0}")]
    NoEssentialPaths(EdgeId),
    #[error("block {at_block} is less than specified edge creation block {creation_block}")]
    BlockBeforeCreation { at_block: u64, creation_block: u64 },
    #[error("challenge level {level} out of range for {total} total levels")]
    InvalidChallengeLevel { level: u8, total: u8 },
    #[error("could not bisect edge {edge}: {source}")]
    Bisection {
        edge: EdgeId,
        #[source]
        source: BisectionError,
    },
    #[error("history checker is still syncing: {0}")]
    StillSyncing(String),
}

impl TreeError {
    /// Returns `true` for the errors caused by edges the tree has not observed yet. Callers are
    /// expected to retry once more edges have been added.
    pub fn is_not_yet_available(&self) -> bool {
        matches!(
            self,
            TreeError::NotFound(_)
                | TreeError::NoHonestEdgesAtLevel(_)
                | TreeError::NoLevelZeroEdge { .. }
                | TreeError::NoHonestTopLevelEdge
                | TreeError::ClaimedEdgeNotFound(_)
                | TreeError::ChildrenNotYetSeen(_)
                | TreeError::AncestorNotTracked(_)
        )
    }

    /// Returns `true` if `err` wraps a [TreeError] that is not yet available.
    pub fn is_not_yet_available_err(err: &anyhow::Error) -> bool {
        err.chain()
            .filter_map(|cause| cause.downcast_ref::<TreeError>())
            .any(TreeError::is_not_yet_available)
    }
}
