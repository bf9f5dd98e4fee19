//! The `context` module contains the [ChallengeContext] handed to trackers and confirmation jobs.

use std::sync::atomic::{AtomicU64, Ordering};

/// The [ChallengeContext] struct carries the validator identity and the activity counters of a
/// single challenger process.
#[derive(Debug, Default)]
pub struct ChallengeContext {
    pub validator_name: String,
    pub counters: Counters,
}

impl ChallengeContext {
    pub fn new(validator_name: impl Into<String>) -> Self {
        Self {
            validator_name: validator_name.into(),
            counters: Counters::default(),
        }
    }
}

/// The [Counters] struct counts the moves and confirmations made by a challenger.
#[derive(Debug, Default)]
pub struct Counters {
    /// Edge trackers spawned.
    pub spawned: AtomicU64,
    pub bisected: AtomicU64,
    /// Level zero edges opened in subchallenges.
    pub layer_zero_leaves: AtomicU64,
    pub one_step_proofs: AtomicU64,
    pub confirmed_by_timer: AtomicU64,
    pub confirmed_by_children: AtomicU64,
    pub confirmed_by_claim: AtomicU64,
    pub confirmation_jobs: AtomicU64,
}

impl Counters {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads a counter.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
