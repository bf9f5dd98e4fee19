//! The royal challenge tree: the honest edges of a single challenge, observed across every
//! challenge level, and the timer, ancestor and essential path computations used to decide when
//! they can be confirmed.
//!
//! Every computation here is synchronous and works on in-memory state, except for the few that
//! consult the [MetadataReader](bold_challenger_primitives::MetadataReader) or the
//! [HistoryChecker](bold_challenger_primitives::HistoryChecker).

mod errors;
pub use errors::TreeError;

mod tree;
pub use tree::RoyalChallengeTree;

mod local_timer;

mod inherited_timer;

mod ancestors;
pub use ancestors::Ancestor;

mod paths;
pub use paths::{Confirmability, EssentialPath};

#[cfg(test)]
mod fixtures;
