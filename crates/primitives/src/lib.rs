//! Core types shared across the bold-challenger crates: edge identifiers and records, history
//! commitment requests, bisection math, thread safe containers and the interfaces of the
//! on-chain and state collaborators the challenge logic is driven against.

pub mod containers;

mod types;
pub use types::*;

mod edge;
pub use edge::{Edge, EdgeStatus};

mod history;
pub use history::*;

pub mod bisection;

mod errors;
pub use errors::{is_bad_one_step_proof, is_cached_time_sufficient, is_chain_catching_up, ProtocolError};

mod interfaces;
pub use interfaces::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
