#![doc = include_str!("../README.md")]

use anyhow::Result;
use async_trait::async_trait;

mod config;
pub use config::TrackerConfig;

mod context;
pub use context::{ChallengeContext, Counters};

mod errors;
pub use errors::DriverError;

mod fsm;
pub use fsm::{
    next_state, Action, Fsm, FsmSummary, State, Taken, Transition, HISTORY_LIMIT, TRANSITIONS,
};

mod registry;
pub use registry::TrackedEdges;

pub mod retry;

mod confirmation;
pub use confirmation::ChallengeConfirmer;

mod tracker;
pub use tracker::{EdgeTracker, TrackerEnv};

#[cfg(test)]
mod mock;

/// The [Driver] trait defines the interface for the long running loops of the `bold-challenger`.
#[async_trait]
pub trait Driver {
    /// Runs the loop until it completes or is cancelled.
    async fn start_loop(self) -> Result<()>;
}
