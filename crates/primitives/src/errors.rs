//! Distinguished conditions reported by the on-chain and state collaborators.

use thiserror::Error;

/// The [ProtocolError] enum contains the collaborator failures that callers react to
/// differently from a generic failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The local state provider has not yet synced far enough to answer.
    #[error("chain catching up")]
    ChainCatchingUp,
    /// The one step proof was rejected by the challenge manager.
    #[error("bad one step proof data")]
    BadOneStepProof,
    /// The on-chain cached inherited timer of an edge is already large enough.
    #[error("CachedTimeSufficient")]
    CachedTimeSufficient,
}

impl ProtocolError {
    /// Returns `true` if `err` is this condition, either as a typed [ProtocolError] anywhere in
    /// its context chain or, for backends that only surface messages, by its well known text.
    pub fn matches(&self, err: &anyhow::Error) -> bool {
        if err
            .chain()
            .any(|cause| cause.downcast_ref::<ProtocolError>() == Some(self))
        {
            return true;
        }
        format!("{err:#}").contains(&self.to_string())
    }
}

/// Returns `true` if `err` signals the history checker is still syncing.
pub fn is_chain_catching_up(err: &anyhow::Error) -> bool {
    ProtocolError::ChainCatchingUp.matches(err)
}

/// Returns `true` if `err` signals a rejected one step proof.
pub fn is_bad_one_step_proof(err: &anyhow::Error) -> bool {
    ProtocolError::BadOneStepProof.matches(err)
}

/// Returns `true` if `err` signals an on-chain cached timer that needs no further update.
pub fn is_cached_time_sufficient(err: &anyhow::Error) -> bool {
    ProtocolError::CachedTimeSufficient.matches(err)
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn matches_typed_errors_through_context() {
        let err = Err::<(), _>(ProtocolError::ChainCatchingUp)
            .context("could not check history commitment agreement")
            .unwrap_err();
        assert!(is_chain_catching_up(&err));
        assert!(!is_bad_one_step_proof(&err));
    }

    #[test]
    fn matches_message_only_errors() {
        let err = anyhow!("execution reverted: CachedTimeSufficient(100)");
        assert!(is_cached_time_sufficient(&err));
        let err = anyhow!("rpc error: timeout");
        assert!(!is_cached_time_sufficient(&err));
        assert!(!is_chain_catching_up(&err));
    }
}
