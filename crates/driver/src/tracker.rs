//! The `tracker` module contains the [EdgeTracker], the task that makes the honest moves on a
//! single royal edge until it, or the claim it defends, is confirmed.

use crate::{
    confirmation::ChallengeConfirmer,
    context::Counters,
    errors::DriverError,
    fsm::{Action, Fsm, FsmSummary, State},
    ChallengeContext, Driver, TrackedEdges, TrackerConfig,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bold_challenger_primitives::{
    bisection, is_bad_one_step_proof, AssociatedAssertionMetadata, ChainWriter, ChallengeManager,
    Edge, EdgeId, EdgeStatus, Height, HistoryCommitmentRequest, MetadataReader, ProtocolError,
    StateProvider,
};
use bold_challenger_tree::{RoyalChallengeTree, TreeError};
use std::sync::Arc;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// Logs a tracker event, prefixed with the fields identifying the tracked edge.
macro_rules! track {
    ($level:ident, $tracker:expr, $($arg:tt)+) => {
        tracing::$level!(
            target: "edge-tracker",
            id = %$tracker.edge.id.short(),
            start_height = $tracker.edge.start_height,
            end_height = $tracker.edge.end_height,
            challenge_level = %$tracker.edge.challenge_level,
            validator = %$tracker.env.context.validator_name,
            claimed_assertion = %$tracker.env.assertion_metadata.claimed_assertion_hash.short(),
            $($arg)+
        )
    };
}

/// The [TrackerEnv] struct bundles the collaborators and shared state of every tracker in a
/// challenge. Clones share all of it.
#[derive(Clone)]
pub struct TrackerEnv {
    pub tree: Arc<RoyalChallengeTree>,
    pub manager: Arc<dyn ChallengeManager>,
    pub state_provider: Arc<dyn StateProvider>,
    pub metadata_reader: Arc<dyn MetadataReader>,
    pub confirmer: ChallengeConfirmer,
    /// The execution range the challenge is about.
    pub assertion_metadata: AssociatedAssertionMetadata,
    pub config: Arc<TrackerConfig>,
    pub context: Arc<ChallengeContext>,
    pub tracked: TrackedEdges,
    /// Stops every tracker and confirmation job of the challenge.
    pub cancel: CancellationToken,
}

impl TrackerEnv {
    /// Creates a new [TrackerEnv] with an empty [TrackedEdges] registry.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tree: Arc<RoyalChallengeTree>,
        manager: Arc<dyn ChallengeManager>,
        state_provider: Arc<dyn StateProvider>,
        metadata_reader: Arc<dyn MetadataReader>,
        writer: Arc<dyn ChainWriter>,
        assertion_metadata: AssociatedAssertionMetadata,
        config: Arc<TrackerConfig>,
        context: Arc<ChallengeContext>,
        cancel: CancellationToken,
    ) -> Self {
        let confirmer = ChallengeConfirmer::new(
            Arc::clone(&tree),
            Arc::clone(&manager),
            writer,
            Arc::clone(&context),
            Arc::clone(&config),
            cancel.clone(),
        );
        Self {
            tree,
            manager,
            state_provider,
            metadata_reader,
            confirmer,
            assertion_metadata,
            config,
            context,
            tracked: TrackedEdges::new(),
            cancel,
        }
    }
}

/// The [EdgeTracker] struct drives a single royal edge through the tracker state machine,
/// taking one action per tick.
pub struct EdgeTracker {
    edge: Edge,
    fsm: Fsm,
    env: TrackerEnv,
    created_at: Instant,
}

#[async_trait]
impl Driver for EdgeTracker {
    /// Acts on every tick of the act interval until the tracker despawns, reaches
    /// [State::Confirmed] or is cancelled.
    async fn start_loop(mut self) -> Result<()> {
        let mut interval = tokio::time::interval(self.env.config.act_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.env.cancel.cancelled() => {
                    track!(debug, self, "Edge tracker exiting");
                    return Ok(());
                }
                _ = interval.tick() => {}
            }
            if self.should_despawn().await {
                track!(info, self, "Tracked edge received notice it should exit, now despawning");
                break;
            }
            if let Err(err) = self.act().await {
                track!(error, self, error = %format!("{err:#}"), "Could not act with edge tracker");
            }
            if self.fsm.current().is_terminal() {
                track!(info, self, "Edge tracker reached a terminal state");
                break;
            }
        }
        self.env.tracked.remove(&self.edge.id);
        Ok(())
    }
}

impl EdgeTracker {
    pub fn new(edge: Edge, env: TrackerEnv) -> Self {
        Self {
            edge,
            fsm: Fsm::new(),
            env,
            created_at: Instant::now(),
        }
    }

    pub fn edge(&self) -> &Edge {
        &self.edge
    }

    pub fn current_state(&self) -> State {
        self.fsm.current()
    }

    pub fn fsm(&self) -> &Fsm {
        &self.fsm
    }

    pub fn fsm_summary(&self) -> FsmSummary {
        self.fsm.summary()
    }

    /// Starts the tracker on its own task, unless another tracker already owns the edge.
    ///
    /// ### Returns
    /// - `Some(JoinHandle)`: The handle of the tracker's task.
    /// - `None`: The edge is already tracked.
    pub fn spawn(self) -> Option<JoinHandle<Result<()>>> {
        if !self.env.tracked.try_mark(self.edge.id) {
            track!(trace, self, "Edge already tracked, not spawning another tracker");
            return None;
        }
        Counters::incr(&self.env.context.counters.spawned);
        track!(info, self, "Now tracking challenge edge locally and making moves");
        Some(tokio::spawn(self.start_loop()))
    }

    /// Takes the next action from the current state. Failures of the action itself are folded
    /// into a fallback transition, so only an invalid transition is returned as an error.
    pub async fn act(&mut self) -> Result<()> {
        match self.fsm.current() {
            State::Started => self.act_started().await,
            State::AtOneStepProof => self.act_at_one_step_proof().await,
            State::AddingSubchallengeLeaf => self.act_adding_subchallenge_leaf().await,
            State::Bisecting => self.act_bisecting().await,
            State::Confirming => self.act_confirming().await,
            State::Confirmed => Ok(()),
        }
    }

    async fn act_started(&mut self) -> Result<()> {
        if self.can_one_step_prove() {
            return self.transition(Action::HandleOneStepProof);
        }
        match self.try_to_confirm().await {
            Ok(true) => return self.transition(Action::Confirm),
            Ok(false) => {}
            Err(err) => {
                return self.fail(
                    "Could not check if edge can be confirmed from start state",
                    err,
                    Action::BackToStart,
                )
            }
        }
        match self.env.manager.has_rival(self.edge.id).await {
            Ok(true) => {}
            Ok(false) => return self.transition(Action::BackToStart),
            Err(err) => {
                return self.fail("Could not check if edge has rival", err, Action::BackToStart)
            }
        }
        match self.env.manager.has_length_one_rival(self.edge.id).await {
            Ok(true) => self.transition(Action::OpenSubchallengeLeaf),
            Ok(false) => self.transition(Action::Bisect),
            Err(err) => self.fail(
                "Could not check if edge has length one rival",
                err,
                Action::BackToStart,
            ),
        }
    }

    async fn act_at_one_step_proof(&mut self) -> Result<()> {
        if let Some(action) = self.skip_if_essential_ancestor_confirmable().await {
            return self.transition_or_fail(action);
        }
        match self.submit_one_step_proof().await {
            Ok(()) => self.transition(Action::Confirm),
            // TODO: check the edge status on-chain before treating a rejected proof as resolved.
            Err(err) if is_bad_one_step_proof(&err) => self.fail(
                "One step proof rejected, assuming the edge was already resolved",
                err,
                Action::Confirm,
            ),
            Err(err) => self.fail("Could not submit one step proof", err, Action::BackToStart),
        }
    }

    async fn act_adding_subchallenge_leaf(&mut self) -> Result<()> {
        if let Some(action) = self.skip_if_essential_ancestor_confirmable().await {
            return self.transition_or_fail(action);
        }
        match self.open_subchallenge_leaf().await {
            Ok(leaf) => {
                Counters::incr(&self.env.context.counters.layer_zero_leaves);
                self.spawn_tracker(leaf);
                self.transition(Action::AwaitConfirmation)
            }
            Err(err) => self.fail("Could not open subchallenge leaf", err, Action::BackToStart),
        }
    }

    async fn act_bisecting(&mut self) -> Result<()> {
        if let Some(action) = self.skip_if_essential_ancestor_confirmable().await {
            return self.transition_or_fail(action);
        }
        match self.bisect().await {
            Ok((lower, upper)) => {
                Counters::incr(&self.env.context.counters.bisected);
                self.spawn_tracker(lower);
                self.spawn_tracker(upper);
                self.transition(Action::AwaitConfirmation)
            }
            Err(err) => self.fail("Could not bisect", err, Action::BackToStart),
        }
    }

    async fn act_confirming(&mut self) -> Result<()> {
        match self.try_to_confirm().await {
            Ok(true) => self.transition(Action::Confirm),
            Ok(false) => self.transition(Action::AwaitConfirmation),
            Err(err) => self.fail(
                "Could not check if edge can be confirmed",
                err,
                Action::AwaitConfirmation,
            ),
        }
    }

    /// Moves already made below a confirmable essential ancestor are wasted, so the move is
    /// skipped in favour of waiting for the confirmation.
    ///
    /// ### Returns
    /// - `Some(Ok(Action))`: The move should be skipped with the given action.
    /// - `Some(Err(anyhow::Error))`: The check failed and the tracker should start over.
    /// - `None`: The move should be made.
    async fn skip_if_essential_ancestor_confirmable(&self) -> Option<Result<Action>> {
        match self.essential_ancestor_confirmable().await {
            Ok(true) => Some(Ok(Action::AwaitConfirmation)),
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }

    fn transition_or_fail(&mut self, action: Result<Action>) -> Result<()> {
        match action {
            Ok(action) => self.transition(action),
            Err(err) => self.fail(
                "Could not check if closest essential ancestor is confirmable",
                err,
                Action::BackToStart,
            ),
        }
    }

    fn transition(&mut self, action: Action) -> Result<()> {
        let from = self.fsm.current();
        let to = self.fsm.do_action(action)?;
        track!(trace, self, from = %from, to = %to, "Edge tracker took action {action}");
        Ok(())
    }

    /// Logs `err`, records it on the state machine and takes the `fallback` action.
    fn fail(&mut self, what: &str, err: anyhow::Error, fallback: Action) -> Result<()> {
        self.report(what, &err);
        self.fsm.mark_error(&err);
        self.transition(fallback)
    }

    fn report(&self, what: &str, err: &anyhow::Error) {
        let error = format!("{err:#}");
        let diverged = err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<DriverError>(),
                Some(DriverError::TimerBelowChallengePeriod { .. })
            )
        });
        if TreeError::is_not_yet_available_err(err) {
            track!(debug, self, error = %error, "{what}");
        } else if diverged || self.created_at.elapsed() >= self.env.config.stuck_threshold {
            track!(error, self, error = %error, "{what}");
        } else {
            track!(warn, self, error = %error, "{what}");
        }
    }

    fn spawn_tracker(&self, edge: Edge) {
        let edge_id = edge.id;
        if EdgeTracker::new(edge, self.env.clone()).spawn().is_none() {
            track!(debug, self, child = %edge_id.short(), "Spawned edge already has a tracker");
        }
    }

    /// Records an edge this tracker created in the challenge tree. The edge would otherwise
    /// only be tracked once it is observed on-chain.
    fn add_verified_honest_edge(&self, edge: Edge) {
        if let Err(err) = self.env.tree.add_royal_edge(edge) {
            track!(error, self, error = %err, "Could not add verified honest edge to challenge tree");
        }
    }

    fn can_one_step_prove(&self) -> bool {
        self.edge.is_proof_edge(self.env.tree.total_challenge_levels())
    }

    fn is_root_block_challenge_edge(&self) -> bool {
        self.edge.is_level_zero() && self.edge.challenge_level.is_block_level()
    }

    /// An edge despawns once it is confirmed on-chain. Edges without a claim that cannot be
    /// one step proven also despawn once their closest essential ancestor is confirmed.
    async fn should_despawn(&mut self) -> bool {
        match self.env.manager.edge_status(self.edge.id).await {
            Ok(EdgeStatus::Confirmed) => {
                self.mark_confirmed();
                if !self.fsm.current().is_terminal() {
                    if let Err(err) = self.transition(Action::Confirm) {
                        track!(error, self, error = %err, "Could not move confirmed edge to confirmed");
                    }
                }
                return true;
            }
            Ok(EdgeStatus::Pending) => {}
            Err(err) => {
                track!(error, self, error = %format!("{err:#}"), "Could not get edge status");
                return false;
            }
        }
        if self.edge.is_level_zero() || self.can_one_step_prove() {
            return false;
        }
        let essential = match self.env.tree.closest_essential_ancestor(&self.edge.id) {
            Ok(essential) => essential,
            Err(err) if err.is_not_yet_available() => return false,
            Err(err) => {
                track!(error, self, error = %err, "Could not get edge closest essential ancestor");
                return false;
            }
        };
        match self.env.manager.edge_status(essential.id).await {
            Ok(status) => status == EdgeStatus::Confirmed,
            Err(err) => {
                track!(
                    error,
                    self,
                    error = %format!("{err:#}"),
                    "Could not get closest essential ancestor status"
                );
                false
            }
        }
    }

    fn mark_confirmed(&self) {
        if let Err(err) = self.env.tree.mark_edge_confirmed(&self.edge.id) {
            track!(debug, self, error = %err, "Confirmed edge is not in the challenge tree");
        }
    }

    /// Attempts every confirmation route, cheapest first: already confirmed, confirmed
    /// children, a confirmed claiming edge, then the honest path timer. The block challenge root
    /// edge may additionally be confirmed through a confirmation job.
    ///
    /// ### Returns
    /// - `Ok(true)`: The edge is confirmed.
    /// - `Ok(false)`: No route applies yet.
    pub async fn try_to_confirm(&self) -> Result<bool> {
        let manager = &self.env.manager;
        let counters = &self.env.context.counters;
        let edge_id = self.edge.id;

        let status = manager
            .edge_status(edge_id)
            .await
            .context("could not get edge status")?;
        if status == EdgeStatus::Confirmed {
            self.mark_confirmed();
            return Ok(true);
        }

        let onchain = manager
            .get_edge(edge_id)
            .await
            .context("could not get edge")?
            .unwrap_or_else(|| self.edge.clone());
        if let (Some(lower), Some(upper)) = (onchain.lower_child_id, onchain.upper_child_id) {
            let lower_status = manager
                .edge_status(lower)
                .await
                .context("could not get lower child status")?;
            let upper_status = manager
                .edge_status(upper)
                .await
                .context("could not get upper child status")?;
            if lower_status == EdgeStatus::Confirmed && upper_status == EdgeStatus::Confirmed {
                manager
                    .confirm_by_children(edge_id)
                    .await
                    .context("could not confirm edge by children")?;
                Counters::incr(&counters.confirmed_by_children);
                self.mark_confirmed();
                track!(info, self, "Confirmed edge by children");
                return Ok(true);
            }
        }

        if self.edge.has_length_one() {
            let claiming = match self.env.tree.confirmed_edge_with_claim_exists(edge_id.into()) {
                Some(claiming) => Some(claiming),
                None => manager
                    .confirmed_edge_with_claim(edge_id.into())
                    .await
                    .context("could not look for a confirmed claiming edge")?,
            };
            if let Some(claiming) = claiming {
                manager
                    .confirm_by_claim(edge_id, claiming)
                    .await
                    .context("could not confirm edge by claim")?;
                Counters::incr(&counters.confirmed_by_claim);
                self.mark_confirmed();
                track!(info, self, claiming = %claiming.short(), "Confirmed edge by claim");
                return Ok(true);
            }
        }

        let period = manager
            .challenge_period_blocks()
            .await
            .context("could not get challenge period")?;
        let at_block = manager
            .latest_block_number()
            .await
            .context("could not get latest block number")?;
        match self.env.tree.compute_honest_path_timer(&edge_id, at_block).await {
            Ok((timer, ancestors)) if timer >= period => {
                let ancestor_ids = ancestors
                    .iter()
                    .map(|ancestor| ancestor.edge.id)
                    .collect::<Vec<EdgeId>>();
                manager
                    .confirm_by_timer(edge_id, &ancestor_ids)
                    .await
                    .context("could not confirm edge by timer")?;
                Counters::incr(&counters.confirmed_by_timer);
                self.mark_confirmed();
                track!(info, self, timer, period, "Confirmed edge by timer");
                return Ok(true);
            }
            Ok((timer, _)) => {
                track!(debug, self, timer, period, "Honest path timer not big enough to confirm edge");
            }
            Err(err) if TreeError::is_not_yet_available_err(&err) => {
                track!(debug, self, error = %format!("{err:#}"), "Honest path not yet observed");
            }
            Err(err) => return Err(err.context("could not compute honest path timer")),
        }

        if self.is_root_block_challenge_edge() {
            return self.confirm_root_by_inherited_timer(period, at_block).await;
        }
        Ok(false)
    }

    /// Confirms the block challenge root edge once its locally computed inherited timer reaches
    /// the challenge period, pushing the timers on-chain first if needed.
    async fn confirm_root_by_inherited_timer(&self, period: u64, at_block: u64) -> Result<bool> {
        let computed = match self.env.tree.compute_root_inherited_timer(at_block).await {
            Ok(timer) => timer,
            Err(err) if TreeError::is_not_yet_available_err(&err) => return Ok(false),
            Err(err) => return Err(err.context("could not compute root inherited timer")),
        };
        if computed < period {
            track!(debug, self, computed, period, "Local computed timer not big enough to confirm edge");
            return Ok(false);
        }
        let onchain = self
            .env
            .manager
            .inherited_timer(self.edge.id)
            .await
            .context("could not get onchain inherited timer")?;
        track!(info, self, computed, onchain, period, "Local computed timer big enough to confirm edge");
        if onchain >= period {
            self.env
                .manager
                .confirm_by_timer(self.edge.id, &[])
                .await
                .context("could not confirm root edge by timer")?;
            Counters::incr(&self.env.context.counters.confirmed_by_timer);
            self.mark_confirmed();
            return Ok(true);
        }
        self.env
            .confirmer
            .begin_confirmation_job(&self.edge, period)
            .await
            .with_context(|| {
                format!(
                    "could not complete confirmation job for essential root edge at level {}",
                    self.edge.challenge_level.0
                )
            })?;
        Ok(true)
    }

    async fn essential_ancestor_confirmable(&self) -> Result<bool> {
        let manager = &self.env.manager;
        let period = manager
            .challenge_period_blocks()
            .await
            .context("could not get challenge period")?;
        let at_block = manager
            .latest_block_number()
            .await
            .context("could not get latest block number")?;
        match self
            .env
            .tree
            .is_essential_ancestor_confirmable(&self.edge.id, period, at_block)
        {
            Ok(confirmable) => Ok(confirmable),
            Err(err) if err.is_not_yet_available() => Ok(false),
            Err(err) => Err(anyhow::Error::new(err)
                .context("could not check if closest essential ancestor is confirmable")),
        }
    }

    /// The heights at which each enclosing challenge level was narrowed to a single step.
    async fn origin_heights(&self) -> Result<Vec<Height>> {
        if self.edge.challenge_level.is_block_level() {
            return Ok(Vec::new());
        }
        Ok(self
            .env
            .metadata_reader
            .top_level_claim_heights(self.edge.id)
            .await
            .context("could not get top level claim heights")?
            .challenge_origin_heights)
    }

    fn request(&self, origin_heights: &[Height], up_to_height: Option<Height>) -> HistoryCommitmentRequest {
        HistoryCommitmentRequest {
            assertion_metadata: self.env.assertion_metadata.clone(),
            upper_challenge_origin_heights: origin_heights.to_vec(),
            from_height: 0,
            up_to_height,
        }
    }

    /// Bisects the edge at its mandatory bisection height and records both children in the
    /// challenge tree.
    async fn bisect(&self) -> Result<(Edge, Edge)> {
        let (start, end) = (self.edge.start_height, self.edge.end_height);
        let mid = bisection::bisect(start, end).map_err(|source| TreeError::Bisection {
            edge: self.edge.id,
            source,
        })?;
        let heights = self.origin_heights().await?;
        let history = self
            .env
            .state_provider
            .history_commitment(&self.request(&heights, Some(mid)))
            .await
            .context("could not produce history commitment")?;
        let proof = self
            .env
            .state_provider
            .prefix_proof(&self.request(&heights, Some(end)), mid)
            .await
            .context("could not produce prefix proof")?;
        let (lower, upper) = self
            .env
            .manager
            .bisect(self.edge.id, history.merkle, proof)
            .await
            .with_context(|| {
                format!(
                    "{} could not bisect to height={mid},commit={} from height={end},commit={}",
                    self.env.context.validator_name, history.merkle, self.edge.end_commitment
                )
            })?;
        track!(info, self, bisect_to = mid, "Bisecting honest edge");

        self.add_verified_honest_edge(lower.clone());
        self.add_verified_honest_edge(upper.clone());
        if let Err(err) = self
            .env
            .tree
            .update_edge_children(&self.edge.id, lower.id, upper.id)
        {
            track!(debug, self, error = %err, "Could not link children in challenge tree");
        }
        Ok((lower, upper))
    }

    /// Opens the level zero edge of the next challenge level under this length one edge.
    async fn open_subchallenge_leaf(&self) -> Result<Edge> {
        let mut heights = self.origin_heights().await?;
        heights.push(self.edge.start_height);
        let state_provider = &self.env.state_provider;

        let end = state_provider
            .history_commitment(&self.request(&heights, None))
            .await
            .with_context(|| {
                format!("could not compute end history commitment with origin heights {heights:?}")
            })?;
        let proof = state_provider
            .prefix_proof(&self.request(&heights, Some(end.height)), 0)
            .await
            .with_context(|| {
                format!("could not compute prefix proof up to height {}", end.height)
            })?;
        let start = state_provider
            .history_commitment(&self.request(&heights, Some(0)))
            .await
            .context("could not compute start history commitment")?;
        track!(
            info,
            self,
            first_leaf = %start.merkle,
            last_leaf = %end.merkle,
            "Identified single point of disagreement within a challenge level, now opening subchallenge"
        );

        let leaf = self
            .env
            .manager
            .add_subchallenge_level_zero_edge(&self.edge, &start, &end, proof)
            .await
            .context("could not add subchallenge level zero edge")?;
        track!(
            info,
            self,
            subchallenge_level = %leaf.challenge_level,
            leaf = %leaf.id.short(),
            "Successfully created a subchallenge edge"
        );
        self.add_verified_honest_edge(leaf.clone());
        Ok(leaf)
    }

    /// Resolves this proof edge with a one step proof. Failing to produce the proof data is
    /// reported as [ProtocolError::BadOneStepProof].
    async fn submit_one_step_proof(&self) -> Result<()> {
        track!(
            info,
            self,
            "Identified single step of disagreement at the execution of a block, submitting one step proof"
        );
        let heights = self.origin_heights().await?;
        let data = self
            .env
            .state_provider
            .one_step_proof_data(&self.request(&heights, None), self.edge.start_height)
            .await
            .map_err(|err| {
                anyhow::Error::new(ProtocolError::BadOneStepProof)
                    .context(format!("could not get one step data: {err:#}"))
            })?;
        self.env
            .manager
            .confirm_edge_by_one_step_proof(self.edge.id, &data)
            .await
            .context("could not confirm one step proof against protocol")?;
        Counters::incr(&self.env.context.counters.one_step_proofs);
        self.mark_confirmed();
        track!(info, self, "Succeeded one step proof for edge and confirmed it as winner");
        Ok(())
    }
}
