//! Leaf-value and gain primitives shared by every partitioner.
//!
//! # Gain criterion
//!
//! A candidate partition is scored by the reduction of the
//! sum-of-squares-of-gradient surrogate objective:
//!
//! ```text
//! partial(node) = Σ_s G_s² / D_s
//! Δgain = Σ_children partial(child) − partial(parent)
//! ```
//!
//! where `D` is the hessian sum (Newton) or the weight sum when Newton gain
//! is disabled or the objective has no hessian. Leaf values follow the same
//! denominator choice: `−G / D` for a Newton or gradient step, or the raw
//! gradient sum when the caller asked for unnormalized sums.

use crate::flags::TermBoostFlags;
use crate::histogram::MainBins;

/// Sentinel gain reporting numeric failure without a structured error.
pub const ILLEGAL_GAIN: f64 = f64::NEG_INFINITY;

/// Denominator and output choices derived once per call from the flags and
/// the objective's capabilities.
#[derive(Debug, Clone, Copy)]
pub struct UpdateRules {
    /// Gain denominators use the weight sum instead of the hessian sum.
    pub gain_uses_weight: bool,
    /// Update denominators use the weight sum instead of the hessian sum.
    pub update_uses_weight: bool,
    /// Emit raw gradient sums instead of normalized updates.
    pub gradient_sums: bool,
}

impl UpdateRules {
    pub fn from_flags(flags: TermBoostFlags, has_hessian: bool) -> Self {
        Self {
            gain_uses_weight: !has_hessian || flags.contains(TermBoostFlags::DISABLE_NEWTON_GAIN),
            update_uses_weight: !has_hessian
                || flags.contains(TermBoostFlags::DISABLE_NEWTON_UPDATE),
            gradient_sums: flags.contains(TermBoostFlags::GRADIENT_SUMS),
        }
    }
}

/// Accumulated statistics for one candidate partition region.
#[derive(Debug, Clone)]
pub struct NodeStats {
    pub count: u64,
    pub weight: f64,
    /// Per-score gradient sums.
    pub grads: Vec<f64>,
    /// Per-score hessian sums; all zero for gradient-only objectives.
    pub hess: Vec<f64>,
}

impl NodeStats {
    pub fn zeros(n_scores: usize) -> Self {
        Self { count: 0, weight: 0.0, grads: vec![0.0; n_scores], hess: vec![0.0; n_scores] }
    }

    /// Add one histogram bin.
    pub fn add_bin(&mut self, bins: &MainBins, bin: usize) {
        self.count += bins.count(bin);
        self.weight += bins.weight(bin);
        for score in 0..self.grads.len() {
            self.grads[score] += bins.grad(bin, score);
            self.hess[score] += bins.hess(bin, score);
        }
    }

    /// Statistics of the complement region: `self − other`.
    pub fn minus(&self, other: &NodeStats) -> Self {
        Self {
            count: self.count.saturating_sub(other.count),
            weight: self.weight - other.weight,
            grads: self.grads.iter().zip(&other.grads).map(|(a, b)| a - b).collect(),
            hess: self.hess.iter().zip(&other.hess).map(|(a, b)| a - b).collect(),
        }
    }

    /// The gain denominator for `score`.
    #[inline]
    pub fn gain_denom(&self, rules: &UpdateRules, score: usize) -> f64 {
        if rules.gain_uses_weight {
            self.weight
        } else {
            self.hess[score]
        }
    }

    /// Whether every score's gain denominator clears `hessian_min`.
    pub fn denoms_viable(&self, rules: &UpdateRules, hessian_min: f64) -> bool {
        (0..self.grads.len()).all(|score| self.gain_denom(rules, score) >= hessian_min)
    }
}

/// Single-region contribution to the gain criterion, summed over scores.
pub fn node_partial_gain(rules: &UpdateRules, stats: &NodeStats) -> f64 {
    let mut total = 0.0;
    for score in 0..stats.grads.len() {
        let denom = stats.gain_denom(rules, score);
        if denom > 0.0 {
            let g = stats.grads[score];
            total += g * g / denom;
        }
    }
    total
}

/// One leaf's update value for `score` under the chosen rules.
pub fn leaf_value(rules: &UpdateRules, stats: &NodeStats, score: usize) -> f64 {
    if rules.gradient_sums {
        return compute_gradient_sum_update(stats.grads[score]);
    }
    let denom = if rules.update_uses_weight { stats.weight } else { stats.hess[score] };
    compute_single_partition_update(stats.grads[score], denom)
}

/// Newton or gradient step: `−G / D`. An exactly empty partition
/// (`D == 0`) produces no update rather than a 0/0 NaN.
#[inline]
pub fn compute_single_partition_update(sum_grad: f64, denom: f64) -> f64 {
    if denom == 0.0 {
        0.0
    } else {
        -(sum_grad / denom)
    }
}

/// Unnormalized update for differentially-private boosting.
#[inline]
pub fn compute_gradient_sum_update(sum_grad: f64) -> f64 {
    sum_grad
}

/// Map a gain that overflowed or lost meaning to +∞ so the orchestrator's
/// single end-of-call check converts it to [`ILLEGAL_GAIN`].
#[inline]
pub fn sanitize_gain(gain: f64) -> f64 {
    if gain.is_finite() {
        debug_assert!(gain >= 0.0);
        gain.max(0.0)
    } else {
        f64::INFINITY
    }
}
