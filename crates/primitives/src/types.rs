//! The types module contains the identifier newtypes and scalar types used across the protocol.

use ethers::types::H256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A height within a history commitment.
pub type Height = u64;

/// A cumulative unrivaled time measured in blocks. [u64::MAX] stands in for an infinite timer.
pub type InheritedTimer = u64;

/// Defines a 32 byte identifier newtype backed by an [H256].
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub H256);

        impl $name {
            #[doc = concat!("Returns the first four bytes of the [", stringify!($name), "] as a hex string, for logging.")]
            pub fn short(&self) -> String {
                let hex = self.0.as_bytes()[..4]
                    .iter()
                    .map(|b| format!("{b:02x}"))
                    .collect::<String>();
                format!("0x{hex}")
            }

            pub fn is_zero(&self) -> bool {
                self.0.is_zero()
            }
        }

        impl From<H256> for $name {
            fn from(hash: H256) -> Self {
                Self(hash)
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(H256::from(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

define_id!(
    /// The content derived identifier of an [Edge](crate::Edge).
    EdgeId
);
define_id!(
    /// Identifier shared by every rival edge: all edges with the same [MutualId] claim the same
    /// starting point and end height and differ only in their end commitment.
    MutualId
);
define_id!(
    /// Identifies the parent-level dispute a subchallenge belongs to. At the block challenge
    /// level it is the assertion's parent; at deeper levels it is the [MutualId] of the
    /// length one edges whose dispute opened the subchallenge.
    OriginId
);
define_id!(
    /// The identifier a level zero edge claims: an assertion hash at the block level, or an
    /// [EdgeId] at the previous level otherwise.
    ClaimId
);
define_id!(
    /// The hash of an assertion on the assertion chain.
    AssertionHash
);

impl From<EdgeId> for ClaimId {
    fn from(id: EdgeId) -> Self {
        Self(id.0)
    }
}

impl From<ClaimId> for EdgeId {
    fn from(id: ClaimId) -> Self {
        Self(id.0)
    }
}

impl From<AssertionHash> for ClaimId {
    fn from(hash: AssertionHash) -> Self {
        Self(hash.0)
    }
}

impl From<ClaimId> for AssertionHash {
    fn from(id: ClaimId) -> Self {
        Self(id.0)
    }
}

impl From<MutualId> for OriginId {
    fn from(id: MutualId) -> Self {
        Self(id.0)
    }
}

/// The [ChallengeLevel] of an edge. Level 0 is the block challenge; every following level is a
/// finer grained subchallenge, down to the small step level at `total_challenge_levels - 1`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChallengeLevel(pub u8);

impl ChallengeLevel {
    /// The block challenge level.
    pub const BLOCK: ChallengeLevel = ChallengeLevel(0);

    pub fn is_block_level(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if this is the deepest level of a protocol with `total` levels.
    pub fn is_smallest_step(&self, total: u8) -> bool {
        total.checked_sub(1) == Some(self.0)
    }

    /// The next, finer grained level.
    pub fn next(&self) -> ChallengeLevel {
        ChallengeLevel(self.0.saturating_add(1))
    }

    /// The reversed index of this level, where the deepest level is 0 and the block challenge
    /// level is `total - 1`. Returns [None] if the level does not exist in a protocol with
    /// `total` levels.
    pub fn reversed(&self, total: u8) -> Option<u8> {
        total.checked_sub(1)?.checked_sub(self.0)
    }
}

impl fmt::Display for ChallengeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "block_challenge_edge"),
            n => write!(f, "subchallenge_level_{n}_edge"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ChallengeLevel, ClaimId, EdgeId};
    use ethers::types::H256;

    #[test]
    fn reversed_levels() {
        assert_eq!(ChallengeLevel(0).reversed(3), Some(2));
        assert_eq!(ChallengeLevel(1).reversed(3), Some(1));
        assert_eq!(ChallengeLevel(2).reversed(3), Some(0));
        assert_eq!(ChallengeLevel(3).reversed(3), None);
        assert_eq!(ChallengeLevel(0).reversed(0), None);
    }

    struct SmallestStepCase(u8, u8, bool);

    const SMALLEST_STEP_CASES: [SmallestStepCase; 6] = [
        SmallestStepCase(2, 3, true),
        SmallestStepCase(1, 3, false),
        SmallestStepCase(0, 1, true),
        SmallestStepCase(0, 0, false),
        SmallestStepCase(254, 255, true),
        SmallestStepCase(u8::MAX, 0, false),
    ];

    #[test]
    fn smallest_step_levels() {
        for SmallestStepCase(level, total, expected) in SMALLEST_STEP_CASES {
            assert_eq!(
                ChallengeLevel(level).is_smallest_step(total),
                expected,
                "level {level} of {total}"
            );
        }
    }

    #[test]
    fn id_conversions_and_display() {
        let id = EdgeId(H256::repeat_byte(0xab));
        let claim: ClaimId = id.into();
        assert_eq!(EdgeId::from(claim), id);
        assert_eq!(id.short(), "0xabababab");
        assert_eq!(id.to_string(), format!("0x{}", "ab".repeat(32)));
        assert!(EdgeId::default().is_zero());
    }
}
