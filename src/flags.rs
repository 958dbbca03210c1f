//! Boosting flags and monotone direction constraints.
//!
//! [`TermBoostFlags`] is the per-call bitmask controlling how leaf updates and
//! gains are computed. Unknown bits are logged and ignored by the
//! orchestrator rather than rejected, so that newer callers degrade
//! gracefully against an older core.

use bitflags::bitflags;

bitflags! {
    /// Per-call options for term-update generation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TermBoostFlags: u32 {
        /// Gain uses the weight sum in the denominator instead of the hessian sum.
        const DISABLE_NEWTON_GAIN = 1 << 0;
        /// Leaf updates use the weight sum in the denominator instead of the hessian sum.
        const DISABLE_NEWTON_UPDATE = 1 << 1;
        /// Emit raw per-score gradient sums with no denominator at all.
        ///
        /// Used by differentially-private boosting, which adds noise to the
        /// sums downstream before normalizing.
        const GRADIENT_SUMS = 1 << 2;
        /// Choose split positions independently of the data.
        const RANDOM_SPLITS = 1 << 3;
    }
}

/// Monotone constraint direction for one term dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonotoneDirection {
    /// No constraint (default).
    #[default]
    None,
    /// Leaf values must not decrease with the bin index.
    Increasing,
    /// Leaf values must not increase with the bin index.
    Decreasing,
}

impl MonotoneDirection {
    /// Create from the conventional integer representation.
    ///
    /// - `0`: no constraint
    /// - positive: increasing
    /// - negative: decreasing
    pub fn from_int(value: i32) -> Self {
        match value {
            0 => Self::None,
            v if v > 0 => Self::Increasing,
            _ => Self::Decreasing,
        }
    }

    /// Convert to the conventional integer representation.
    pub fn to_int(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Increasing => 1,
            Self::Decreasing => -1,
        }
    }

    /// Check if this direction actually constrains anything.
    #[inline]
    pub fn is_constrained(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether the ordered pair `(left, right)` of adjacent leaf values
    /// conforms to this direction.
    #[inline]
    pub fn allows(self, left: f64, right: f64) -> bool {
        match self {
            Self::None => true,
            Self::Increasing => left <= right,
            Self::Decreasing => right <= left,
        }
    }
}
