//! The challenge confirmation job: pushes the locally computed timers of every royal branch
//! on-chain until the block challenge root edge can be confirmed by time.

use crate::{
    context::Counters, errors::DriverError, retry::until_succeeds, ChallengeContext,
    TrackerConfig,
};
use anyhow::{Context, Result};
use bold_challenger_primitives::{
    is_cached_time_sufficient, ChainWriter, ChallengeManager, Edge, EdgeId,
};
use bold_challenger_tree::RoyalChallengeTree;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The [ChallengeConfirmer] struct confirms a whole challenge from its deepest royal edges up.
#[derive(Clone)]
pub struct ChallengeConfirmer {
    tree: Arc<RoyalChallengeTree>,
    manager: Arc<dyn ChallengeManager>,
    writer: Arc<dyn ChainWriter>,
    context: Arc<ChallengeContext>,
    config: Arc<TrackerConfig>,
    cancel: CancellationToken,
}

impl ChallengeConfirmer {
    pub fn new(
        tree: Arc<RoyalChallengeTree>,
        manager: Arc<dyn ChallengeManager>,
        writer: Arc<dyn ChainWriter>,
        context: Arc<ChallengeContext>,
        config: Arc<TrackerConfig>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tree,
            manager,
            writer,
            context,
            config,
            cancel,
        }
    }

    /// Updates the on-chain inherited timers of every royal branch, from the deepest royal
    /// edges up to `root`, until the on-chain timer of `root` reaches the challenge period,
    /// and then confirms `root` by time.
    ///
    /// Must only be called once the locally computed inherited timer of `root` is confirmable.
    /// Every external call is retried until it succeeds or the job is cancelled.
    ///
    /// ### Takes
    /// - `root`: The royal block challenge root edge.
    /// - `challenge_period_blocks`: The timer `root` needs to be confirmed.
    ///
    /// ### Returns
    /// - `Ok(())`: `root` was confirmed.
    /// - `Err(anyhow::Error)`: Wraps [DriverError::TimerBelowChallengePeriod] if every branch
    ///   was updated and the on-chain timer of `root` still fell short, or
    ///   [DriverError::Cancelled].
    pub async fn begin_confirmation_job(
        &self,
        root: &Edge,
        challenge_period_blocks: u64,
    ) -> Result<()> {
        Counters::incr(&self.context.counters.confirmation_jobs);
        tracing::info!(
            target: "challenge-confirmation",
            validator = %self.context.validator_name,
            challenged_assertion = %self.tree.top_level_assertion_hash().short(),
            essential_edge = %root.id.short(),
            challenge_level = %root.challenge_level,
            "Starting challenge confirmation job"
        );

        let branches = self.royal_branches().await?;
        tracing::info!(
            target: "challenge-confirmation",
            validator = %self.context.validator_name,
            "Computed {} royal branches to update onchain",
            branches.len()
        );

        for (index, branch) in branches.iter().enumerate() {
            let onchain_timer = self.propagate_timer_update(branch).await?;
            tracing::info!(
                target: "challenge-confirmation",
                validator = %self.context.validator_name,
                branch = %format!("{index}/{}", branches.len().saturating_sub(1)),
                onchain_timer,
                "Updated the onchain inherited timer for royal branch"
            );
            if onchain_timer >= challenge_period_blocks {
                tracing::info!(
                    target: "challenge-confirmation",
                    validator = %self.context.validator_name,
                    "Branch was confirmable by timer"
                );
                return self.confirm_root(root).await;
            }
        }

        let onchain_timer = self.onchain_timer(&root.id).await?;
        if onchain_timer < challenge_period_blocks {
            tracing::error!(
                target: "challenge-confirmation",
                validator = %self.context.validator_name,
                essential_edge = %root.id.short(),
                "Onchain timer {onchain_timer} was not >= {challenge_period_blocks} after confirmation job"
            );
            return Err(DriverError::TimerBelowChallengePeriod {
                onchain: onchain_timer,
                period: challenge_period_blocks,
            }
            .into());
        }
        self.confirm_root(root).await
    }

    /// Builds one branch per lower most royal edge: the edge followed by its ancestors, up to
    /// the block challenge root.
    async fn royal_branches(&self) -> Result<Vec<Vec<EdgeId>>> {
        let leaves = self.tree.lower_most_royal_edges();
        let (cancel, config, manager, tree) =
            (&self.cancel, &*self.config, &self.manager, &*self.tree);
        let at_block = until_succeeds(cancel, config, || async move {
            manager
                .latest_block_number()
                .await
                .context("could not get latest block number")
        })
        .await?;

        let mut branches = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            let leaf_id = &leaf.id;
            // Ancestors missing from the tree may still be observed while we wait. Any other
            // tree error will not heal on its own.
            let ancestors = until_succeeds(cancel, config, || async move {
                match tree.compute_ancestors(leaf_id, at_block) {
                    Err(err) if !err.is_not_yet_available() => Ok(Err(err)),
                    result => result
                        .map(Ok)
                        .with_context(|| format!("could not compute ancestors of {leaf_id}")),
                }
            })
            .await?
            .with_context(|| format!("could not compute ancestors of {leaf_id}"))?;
            let mut branch = vec![leaf.id];
            branch.extend(ancestors.into_iter().map(|ancestor| ancestor.edge.id));
            branches.push(branch);
        }
        Ok(branches)
    }

    /// Pushes the timers of `branch` on-chain and returns the resulting on-chain timer of the
    /// branch's root.
    async fn propagate_timer_update(&self, branch: &[EdgeId]) -> Result<u64> {
        let Some(root_id) = branch.last() else {
            return Ok(0);
        };
        let (cancel, config, writer, validator) = (
            &self.cancel,
            &*self.config,
            &self.writer,
            self.context.validator_name.as_str(),
        );
        until_succeeds(cancel, config, || async move {
            match writer.multi_update_inherited_timers(branch).await {
                Err(err) if is_cached_time_sufficient(&err) => {
                    tracing::info!(
                        target: "challenge-confirmation",
                        validator,
                        "Onchain, cached timer for branch is already sufficient, so no need to transact"
                    );
                    Ok(())
                }
                result => result.context("could not transact multi-update inherited timers"),
            }
        })
        .await?;
        self.onchain_timer(root_id).await
    }

    async fn onchain_timer(&self, edge_id: &EdgeId) -> Result<u64> {
        let manager = &self.manager;
        let timer = until_succeeds(&self.cancel, &self.config, || async move {
            manager
                .inherited_timer(*edge_id)
                .await
                .with_context(|| format!("could not get inherited timer of {edge_id}"))
        })
        .await?;
        if let Err(err) = self.tree.update_cached_inherited_timer(edge_id, timer) {
            tracing::debug!(target: "challenge-confirmation", "Could not cache inherited timer: {err}");
        }
        Ok(timer)
    }

    async fn confirm_root(&self, root: &Edge) -> Result<()> {
        let (manager, root_id) = (&self.manager, root.id);
        until_succeeds(&self.cancel, &self.config, || async move {
            manager
                .confirm_by_timer(root_id, &[])
                .await
                .with_context(|| format!("could not confirm {root_id} by timer"))
        })
        .await?;
        Counters::incr(&self.context.counters.confirmed_by_timer);
        if let Err(err) = self.tree.mark_edge_confirmed(&root.id) {
            tracing::debug!(target: "challenge-confirmation", "Could not mark root confirmed: {err}");
        }
        tracing::info!(
            target: "challenge-confirmation",
            validator = %self.context.validator_name,
            essential_edge = %root.id.short(),
            "Essential root edge confirmed by timer"
        );
        Ok(())
    }
}
