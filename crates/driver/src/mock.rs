//! An in-memory challenge manager, state provider and chain writer for the driver's tests.

use bold_challenger_primitives::{
    bisection,
    test_utils::{commitment, HONEST_TAG},
    ChainWriter, ChallengeManager, ClaimId, Edge, EdgeId, EdgeStatus, Height, History,
    HistoryCommitmentRequest, InheritedTimer, OneStepData, ProtocolError, StateProvider,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::types::{Bytes, H256};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

/// The height a subchallenge's level zero edges span.
pub(crate) const LEVEL_HEIGHT: Height = 32;

/// An on-chain call made through the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Bisect(EdgeId, H256),
    AddLeaf(EdgeId),
    OneStepProof(EdgeId),
    ConfirmByTimer(EdgeId, Vec<EdgeId>),
    ConfirmByClaim(EdgeId, EdgeId),
    ConfirmByChildren(EdgeId),
    UpdateTimers(Vec<EdgeId>),
}

/// How the mock answers the next inherited timer update.
#[derive(Debug, Clone)]
pub(crate) enum TimerUpdate {
    /// Sets the last edge of the branch to the given timer.
    Sets(InheritedTimer),
    Fails,
    CachedTimeSufficient,
}

#[derive(Debug)]
pub(crate) struct MockChain {
    pub(crate) block: Mutex<u64>,
    pub(crate) challenge_period: u64,
    pub(crate) edges: Mutex<HashMap<EdgeId, Edge>>,
    pub(crate) rivaled: Mutex<HashSet<EdgeId>>,
    pub(crate) length_one_rivaled: Mutex<HashSet<EdgeId>>,
    pub(crate) timers: Mutex<HashMap<EdgeId, InheritedTimer>>,
    pub(crate) timer_updates: Mutex<VecDeque<TimerUpdate>>,
    pub(crate) calls: Mutex<Vec<Call>>,
    pub(crate) fail_moves: Mutex<bool>,
    pub(crate) one_step_proof_error: Mutex<Option<ProtocolError>>,
    pub(crate) missing_one_step_data: Mutex<bool>,
}

impl MockChain {
    pub(crate) fn new(block: u64, challenge_period: u64) -> Self {
        Self {
            block: Mutex::new(block),
            challenge_period,
            edges: Mutex::default(),
            rivaled: Mutex::default(),
            length_one_rivaled: Mutex::default(),
            timers: Mutex::default(),
            timer_updates: Mutex::default(),
            calls: Mutex::default(),
            fail_moves: Mutex::new(false),
            one_step_proof_error: Mutex::new(None),
            missing_one_step_data: Mutex::new(false),
        }
    }

    pub(crate) fn add(&self, edge: &Edge) {
        self.edges.lock().insert(edge.id, edge.clone());
    }

    pub(crate) fn rival(&self, edge: &Edge) {
        self.rivaled.lock().insert(edge.id);
        if edge.has_length_one() {
            self.length_one_rivaled.lock().insert(edge.id);
        }
    }

    pub(crate) fn confirm(&self, edge_id: &EdgeId) {
        if let Some(edge) = self.edges.lock().get_mut(edge_id) {
            edge.status = EdgeStatus::Confirmed;
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn edge(&self, edge_id: EdgeId) -> Result<Edge> {
        self.edges
            .lock()
            .get(&edge_id)
            .cloned()
            .ok_or_else(|| anyhow!("edge {edge_id} does not exist"))
    }

    fn check_moves(&self) -> Result<()> {
        if *self.fail_moves.lock() {
            return Err(anyhow!("execution reverted"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChallengeManager for MockChain {
    async fn challenge_period_blocks(&self) -> Result<u64> {
        Ok(self.challenge_period)
    }

    async fn latest_block_number(&self) -> Result<u64> {
        Ok(*self.block.lock())
    }

    async fn get_edge(&self, edge_id: EdgeId) -> Result<Option<Edge>> {
        Ok(self.edges.lock().get(&edge_id).cloned())
    }

    async fn edge_status(&self, edge_id: EdgeId) -> Result<EdgeStatus> {
        Ok(self.edge(edge_id)?.status)
    }

    async fn inherited_timer(&self, edge_id: EdgeId) -> Result<InheritedTimer> {
        Ok(self.timers.lock().get(&edge_id).copied().unwrap_or_default())
    }

    async fn has_rival(&self, edge_id: EdgeId) -> Result<bool> {
        Ok(self.rivaled.lock().contains(&edge_id))
    }

    async fn has_length_one_rival(&self, edge_id: EdgeId) -> Result<bool> {
        Ok(self.length_one_rivaled.lock().contains(&edge_id))
    }

    async fn bisect(
        &self,
        edge_id: EdgeId,
        prefix_history_root: H256,
        _prefix_proof: Bytes,
    ) -> Result<(Edge, Edge)> {
        self.check_moves()?;
        let parent = self.edge(edge_id)?;
        let mid = bisection::bisect(parent.start_height, parent.end_height)?;
        let block = *self.block.lock();
        let lower = Edge::new(
            parent.challenge_level,
            parent.origin_id,
            parent.start_height,
            parent.start_commitment,
            mid,
            prefix_history_root,
            None,
            block,
        );
        let upper = Edge::new(
            parent.challenge_level,
            parent.origin_id,
            mid,
            prefix_history_root,
            parent.end_height,
            parent.end_commitment,
            None,
            block,
        );
        self.add(&lower);
        self.add(&upper);
        if let Some(parent) = self.edges.lock().get_mut(&edge_id) {
            parent.lower_child_id = Some(lower.id);
            parent.upper_child_id = Some(upper.id);
        }
        self.record(Call::Bisect(edge_id, prefix_history_root));
        Ok((lower, upper))
    }

    async fn add_subchallenge_level_zero_edge(
        &self,
        challenged_edge: &Edge,
        start: &History,
        end: &History,
        _start_end_prefix_proof: Bytes,
    ) -> Result<Edge> {
        self.check_moves()?;
        let leaf = Edge::new(
            challenged_edge.challenge_level.next(),
            challenged_edge.mutual_id.into(),
            start.height,
            start.merkle,
            end.height,
            end.merkle,
            Some(challenged_edge.id.into()),
            *self.block.lock(),
        );
        self.add(&leaf);
        self.record(Call::AddLeaf(challenged_edge.id));
        Ok(leaf)
    }

    async fn confirm_by_timer(&self, edge_id: EdgeId, ancestors: &[EdgeId]) -> Result<()> {
        self.confirm(&edge_id);
        self.record(Call::ConfirmByTimer(edge_id, ancestors.to_vec()));
        Ok(())
    }

    async fn confirm_by_claim(&self, edge_id: EdgeId, claim_id: EdgeId) -> Result<()> {
        self.confirm(&edge_id);
        self.record(Call::ConfirmByClaim(edge_id, claim_id));
        Ok(())
    }

    async fn confirm_by_children(&self, edge_id: EdgeId) -> Result<()> {
        self.confirm(&edge_id);
        self.record(Call::ConfirmByChildren(edge_id));
        Ok(())
    }

    async fn confirm_edge_by_one_step_proof(
        &self,
        edge_id: EdgeId,
        _data: &OneStepData,
    ) -> Result<()> {
        if let Some(err) = self.one_step_proof_error.lock().clone() {
            return Err(err.into());
        }
        self.confirm(&edge_id);
        self.record(Call::OneStepProof(edge_id));
        Ok(())
    }

    async fn confirmed_edge_with_claim(&self, claim_id: ClaimId) -> Result<Option<EdgeId>> {
        Ok(self
            .edges
            .lock()
            .values()
            .find(|edge| edge.is_confirmed() && edge.claim_id == Some(claim_id))
            .map(|edge| edge.id))
    }
}

#[async_trait]
impl StateProvider for MockChain {
    async fn history_commitment(&self, request: &HistoryCommitmentRequest) -> Result<History> {
        let height = request.up_to_height.unwrap_or(LEVEL_HEIGHT);
        Ok(History {
            height,
            merkle: commitment(height, HONEST_TAG),
        })
    }

    async fn prefix_proof(
        &self,
        _request: &HistoryCommitmentRequest,
        prefix_height: Height,
    ) -> Result<Bytes> {
        Ok(Bytes::from(prefix_height.to_be_bytes().to_vec()))
    }

    async fn one_step_proof_data(
        &self,
        _request: &HistoryCommitmentRequest,
        from_height: Height,
    ) -> Result<OneStepData> {
        if *self.missing_one_step_data.lock() {
            return Err(anyhow!("no machine state at height {from_height}"));
        }
        Ok(OneStepData {
            before_hash: commitment(from_height, HONEST_TAG),
            after_hash: commitment(from_height + 1, HONEST_TAG),
            proof: Bytes::default(),
        })
    }
}

#[async_trait]
impl ChainWriter for MockChain {
    async fn multi_update_inherited_timers(&self, branch: &[EdgeId]) -> Result<()> {
        let update = self
            .timer_updates
            .lock()
            .pop_front()
            .unwrap_or(TimerUpdate::Sets(0));
        match update {
            TimerUpdate::Fails => Err(anyhow!("nonce too low")),
            TimerUpdate::CachedTimeSufficient => Err(anyhow!(
                "execution reverted: {}",
                ProtocolError::CachedTimeSufficient
            )),
            TimerUpdate::Sets(timer) => {
                self.record(Call::UpdateTimers(branch.to_vec()));
                if let Some(last) = branch.last() {
                    let mut timers = self.timers.lock();
                    let current = timers.entry(*last).or_default();
                    *current = (*current).max(timer);
                }
                Ok(())
            }
        }
    }
}
