//! The bisection module computes the mandatory bisection height of a history range.

use crate::Height;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BisectionError {
    #[error("cannot bisect range start={start}, end={end}")]
    UnableToBisect { start: Height, end: Height },
}

/// Computes the height at which the range `[start, end]` must be bisected.
///
/// The bisection point is the unique height in `(start, end)` that is a multiple of the largest
/// possible power of two. Both halves of a range therefore line up with the leaves of the
/// binary merkle tree backing the history commitment.
///
/// ### Takes
/// - `start`: The start height of the range.
/// - `end`: The end height of the range.
///
/// ### Returns
/// - `Ok(Height)`: The bisection height.
/// - `Err(BisectionError)`: The range has length one or less.
pub fn bisect(start: Height, end: Height) -> Result<Height, BisectionError> {
    if start.checked_add(2).map_or(true, |min_end| min_end > end) {
        return Err(BisectionError::UnableToBisect { start, end });
    }
    if start + 2 == end {
        return Ok(start + 1);
    }
    let matching_bits = ((end - 1) ^ start).leading_zeros();
    let mask = u64::MAX << (63 - matching_bits);
    Ok((end - 1) & mask)
}

#[cfg(test)]
mod test {
    use super::{bisect, BisectionError};

    /// 0. `u64` - `start`
    /// 1. `u64` - `end`
    /// 2. `u64` - expected bisection height
    struct BisectionCase(u64, u64, u64);

    const EXPECTED_VALUES: &[BisectionCase] = &[
        BisectionCase(0, 2, 1),
        BisectionCase(0, 4, 2),
        BisectionCase(0, 8, 4),
        BisectionCase(0, 16, 8),
        BisectionCase(8, 16, 12),
        BisectionCase(2, 4, 3),
        BisectionCase(0, 5, 4),
        BisectionCase(4, 16, 8),
        BisectionCase(1, 15, 8),
        BisectionCase(11, 15, 12),
        BisectionCase(0, 32, 16),
        BisectionCase(16, 32, 24),
        BisectionCase(31, 33, 32),
    ];

    #[test]
    fn bisection_points_static() {
        for case in EXPECTED_VALUES {
            let mid = bisect(case.0, case.1).unwrap();
            assert_eq!(mid, case.2, "bisecting [{}, {}]", case.0, case.1);
            assert!(case.0 < mid && mid < case.1);
        }
    }

    #[test]
    fn rejects_short_ranges() {
        for (start, end) in [(0, 1), (5, 5), (6, 5), (u64::MAX - 1, u64::MAX)] {
            assert_eq!(
                bisect(start, end),
                Err(BisectionError::UnableToBisect { start, end })
            );
        }
    }
}
