//! The errors module holds the [DriverError] enum.

use crate::fsm::{Action, State};
use thiserror::Error;

/// The [DriverError] enum contains the failures raised by the driver itself, as opposed to the
/// failures of the collaborators it drives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The cancellation token fired before the operation completed.
    #[error("operation cancelled")]
    Cancelled,
    /// No transition leaves `from` through `action`.
    #[error("invalid transition from {from} via {action}")]
    InvalidTransition { from: State, action: Action },
    /// Every royal branch was pushed on-chain and the root's timer still fell short. The local
    /// view of the challenge and the on-chain one have diverged.
    #[error("onchain timer {onchain} after confirmation job was executed < challenge period {period}")]
    TimerBelowChallengePeriod { onchain: u64, period: u64 },
}
