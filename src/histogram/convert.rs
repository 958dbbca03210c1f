//! Narrow-to-wide bin conversion.
//!
//! After a subset's scatter (and plane reduction), its fast-bin gradient
//! sums are widened to `f64` and added into the main bins. On the final
//! subset of a bag the caller also passes the precomputed counts and weight
//! tensors, which are merged here exactly once so the totals are never
//! double-added no matter how many subsets or planes contributed.

use super::{BinFloat, MainBins};

/// Convert `n_bins` fast bins and add them into `dst`.
///
/// `counts`/`weights` are `Some` only on the call that should also establish
/// the per-bin sample counts and weight sums.
pub fn convert_add_bins<F: BinFloat>(
    n_scores: usize,
    has_hessian: bool,
    n_bins: usize,
    fast_grads: &[F],
    fast_hess: &[F],
    counts: Option<&[u64]>,
    weights: Option<&[f64]>,
    dst: &mut MainBins,
) {
    debug_assert_eq!(fast_grads.len(), n_bins * n_scores);
    debug_assert_eq!(dst.n_scores(), n_scores);
    if has_hessian {
        debug_assert_eq!(fast_hess.len(), fast_grads.len());
    }

    for bin in 0..n_bins {
        for score in 0..n_scores {
            let at = bin * n_scores + score;
            dst.add_grad(bin, score, fast_grads[at].to_f64());
            if has_hessian {
                dst.add_hess(bin, score, fast_hess[at].to_f64());
            }
        }
    }

    if let Some(counts) = counts {
        debug_assert_eq!(counts.len(), n_bins);
        for (bin, &count) in counts.iter().enumerate() {
            dst.add_count(bin, count);
        }
    }
    if let Some(weights) = weights {
        debug_assert_eq!(weights.len(), n_bins);
        for (bin, &weight) in weights.iter().enumerate() {
            dst.add_weight(bin, weight);
        }
    }
}
