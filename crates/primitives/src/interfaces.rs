//! Interfaces of the collaborators the challenge logic is driven against: the assertion chain
//! metadata, the local history checker and state provider, and the challenge manager contract.

use crate::{
    AssertionCreatedInfo, AssertionHash, ChallengeLevel, ClaimId, Edge, EdgeId, EdgeStatus,
    Height, History, HistoryCommitmentRequest, InheritedTimer, OneStepData, OriginHeights,
};
use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Bytes, H256};

/// The [MetadataReader] trait reads assertion and edge metadata from the chain.
#[async_trait]
pub trait MetadataReader: Send + Sync {
    /// Fetches the assertion the challenge containing `edge_id` is about.
    async fn top_level_assertion(&self, edge_id: EdgeId) -> Result<AssertionHash>;

    /// Fetches the number of blocks the assertion `assertion_hash` has been unrivaled for.
    async fn assertion_unrivaled_blocks(&self, assertion_hash: AssertionHash) -> Result<u64>;

    /// Fetches the origin heights of every enclosing challenge level of `edge_id`.
    async fn top_level_claim_heights(&self, edge_id: EdgeId) -> Result<OriginHeights>;

    /// Fetches the creation information of the assertion `assertion_hash`.
    async fn read_assertion_creation_info(
        &self,
        assertion_hash: AssertionHash,
    ) -> Result<AssertionCreatedInfo>;
}

/// The [HistoryChecker] trait compares edge commitments against the locally computed history.
#[async_trait]
pub trait HistoryChecker: Send + Sync {
    /// Checks whether the local history described by `request` agrees with `commitment`.
    ///
    /// ### Takes
    /// - `challenge_level`: The challenge level the commitment was made at.
    /// - `request`: The range of local history to commit to.
    /// - `commitment`: The candidate end history commitment.
    ///
    /// ### Returns
    /// - `Ok(bool)`: Whether the local history agrees.
    /// - `Err(anyhow::Error)`: The check failed. A
    ///   [ProtocolError::ChainCatchingUp](crate::ProtocolError::ChainCatchingUp) means the local
    ///   node is still syncing and the check should be retried.
    async fn agrees_with_history_commitment(
        &self,
        challenge_level: ChallengeLevel,
        request: &HistoryCommitmentRequest,
        commitment: &History,
    ) -> Result<bool>;
}

/// The [StateProvider] trait produces history commitments and proofs over the local history.
#[async_trait]
pub trait StateProvider: Send + Sync {
    /// Computes the history commitment described by `request`.
    async fn history_commitment(&self, request: &HistoryCommitmentRequest) -> Result<History>;

    /// Computes a proof that the commitment up to `prefix_height` is a prefix of the commitment
    /// described by `request`.
    async fn prefix_proof(
        &self,
        request: &HistoryCommitmentRequest,
        prefix_height: Height,
    ) -> Result<Bytes>;

    /// Computes the one step proof data for the step starting at `from_height` under the given
    /// origin heights.
    async fn one_step_proof_data(
        &self,
        request: &HistoryCommitmentRequest,
        from_height: Height,
    ) -> Result<OneStepData>;
}

/// The [ChainWriter] trait pushes cached timer updates to the challenge manager.
#[async_trait]
pub trait ChainWriter: Send + Sync {
    /// Updates the on-chain inherited timers of every edge in `branch`, ordered from leaf to
    /// block challenge root.
    async fn multi_update_inherited_timers(&self, branch: &[EdgeId]) -> Result<()>;
}

/// The [ChallengeManager] trait contains the edge level operations of the on-chain challenge
/// manager.
#[async_trait]
pub trait ChallengeManager: Send + Sync {
    /// The number of blocks an edge must be unrivaled for to be confirmed by time.
    async fn challenge_period_blocks(&self) -> Result<u64>;

    /// The latest block number the challenge manager's state is read at. Local timers are
    /// computed against it.
    async fn latest_block_number(&self) -> Result<u64>;

    /// Fetches the current on-chain view of `edge_id`.
    async fn get_edge(&self, edge_id: EdgeId) -> Result<Option<Edge>>;

    async fn edge_status(&self, edge_id: EdgeId) -> Result<EdgeStatus>;

    /// The inherited timer currently cached on-chain for `edge_id`.
    async fn inherited_timer(&self, edge_id: EdgeId) -> Result<InheritedTimer>;

    /// Whether any rival of `edge_id` exists on-chain.
    async fn has_rival(&self, edge_id: EdgeId) -> Result<bool>;

    /// Whether `edge_id` has a rival and spans a single step.
    async fn has_length_one_rival(&self, edge_id: EdgeId) -> Result<bool>;

    /// Bisects `edge_id` at the height committed to by `prefix_history_root`.
    ///
    /// ### Returns
    /// - `Ok((Edge, Edge))`: The lower and upper children.
    async fn bisect(
        &self,
        edge_id: EdgeId,
        prefix_history_root: H256,
        prefix_proof: Bytes,
    ) -> Result<(Edge, Edge)>;

    /// Opens a level zero edge at the next challenge level, claiming the length one
    /// `challenged_edge`.
    async fn add_subchallenge_level_zero_edge(
        &self,
        challenged_edge: &Edge,
        start: &History,
        end: &History,
        start_end_prefix_proof: Bytes,
    ) -> Result<Edge>;

    /// Confirms `edge_id` once its path timer, summed over `ancestors`, exceeds a challenge
    /// period.
    async fn confirm_by_timer(&self, edge_id: EdgeId, ancestors: &[EdgeId]) -> Result<()>;

    /// Confirms `edge_id` because the confirmed edge `claim_id` claims it.
    async fn confirm_by_claim(&self, edge_id: EdgeId, claim_id: EdgeId) -> Result<()>;

    /// Confirms `edge_id` because both of its children are confirmed.
    async fn confirm_by_children(&self, edge_id: EdgeId) -> Result<()>;

    /// Resolves the proof edge `edge_id` by executing a one step proof.
    async fn confirm_edge_by_one_step_proof(
        &self,
        edge_id: EdgeId,
        data: &OneStepData,
    ) -> Result<()>;

    /// Finds a confirmed edge claiming `claim_id`, if one exists.
    async fn confirmed_edge_with_claim(&self, claim_id: ClaimId) -> Result<Option<EdgeId>>;
}
