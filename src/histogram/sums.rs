//! Gradient scatter into fast bins.
//!
//! The hot loop of the whole core: for every sample in a subset, decode its
//! packed tensor-bin index and add its (weighted) gradient pair into the
//! addressed fast bin. When the subset runs SIMD kernels the scatter keeps
//! one bin plane per lane so consecutive samples never collide on a bin;
//! the planes are folded back into one before conversion.

use crate::data::{FloatWidth, PackedIndexes, SubsetCaps};

use super::BinFloat;

/// Plane byte budgets for lane-parallel binning, per bin layout class.
///
/// Lane planes multiply the fast-bin footprint by the SIMD width; past these
/// sizes the scatter becomes cache-bound and the extra planes lose.
const HESSIAN_PARALLEL_BIN_BYTES_MAX: usize = 48 * 1024;
const GRADIENT_PARALLEL_BIN_BYTES_MAX: usize = 16 * 1024;
const MULTISCORE_PARALLEL_BIN_BYTES_MAX: usize = 24 * 1024;

/// Number of fast-bin planes to scatter into: the subset's SIMD width when
/// lane-parallel binning pays off, otherwise 1.
pub fn parallel_bin_planes(caps: &SubsetCaps, n_scores: usize, tensor_bins: usize) -> usize {
    if caps.simd_width <= 1 || tensor_bins <= 1 {
        return 1;
    }
    let budget = match (caps.has_hessian, n_scores) {
        (true, 1) => HESSIAN_PARALLEL_BIN_BYTES_MAX,
        (true, _) => MULTISCORE_PARALLEL_BIN_BYTES_MAX,
        (false, 1) => GRADIENT_PARALLEL_BIN_BYTES_MAX,
        // Gradient-only multiclass boosting should not happen; never
        // parallel-bin it.
        (false, _) => 0,
    };
    let float_bytes = match caps.float_width {
        FloatWidth::F32 => 4,
        FloatWidth::F64 => 8,
    };
    let pair_fields = if caps.has_hessian { 2 } else { 1 };
    let bytes_per_fast_bin = float_bytes * n_scores * pair_fields;
    let parallel_bytes = bytes_per_fast_bin * tensor_bins * caps.simd_width;
    if parallel_bytes <= budget {
        caps.simd_width
    } else {
        1
    }
}

/// Scatter one subset's gradient pairs into fast bins.
///
/// `grads`/`hess` are score-major over the subset's samples; `weights` is
/// the inner bag's effective weight per sample. `pack` is `None` when the
/// call has collapsed to a single tensor bin, in which case every sample
/// lands in bin 0 and no decoding happens. The output planes are laid out
/// `[plane][bin][score]` with `planes * tensor_bins * n_scores` values.
///
/// Counts and weight sums are *not* written here; they are merged from the
/// precomputed per-(term, bag) tensors during conversion.
#[allow(clippy::too_many_arguments)]
pub fn bin_sums_boosting<F: BinFloat>(
    grads: &[F],
    hess: Option<&[F]>,
    weights: &[F],
    pack: Option<&PackedIndexes>,
    n_scores: usize,
    n_samples: usize,
    tensor_bins: usize,
    planes: usize,
    out_grads: &mut [F],
    out_hess: &mut [F],
) {
    debug_assert_eq!(grads.len(), n_samples * n_scores);
    debug_assert_eq!(weights.len(), n_samples);
    debug_assert_eq!(out_grads.len(), planes * tensor_bins * n_scores);
    if let Some(pack) = pack {
        debug_assert_eq!(pack.len(), n_samples);
    }
    if let Some(hess) = hess {
        debug_assert_eq!(hess.len(), grads.len());
        debug_assert_eq!(out_hess.len(), out_grads.len());
    }

    let plane_len = tensor_bins * n_scores;
    for i in 0..n_samples {
        let bin = pack.map_or(0, |pack| pack.get(i));
        debug_assert!(bin < tensor_bins);
        let plane = if planes > 1 { i % planes } else { 0 };
        let base = plane * plane_len + bin * n_scores;
        let w = weights[i];
        for score in 0..n_scores {
            let g = grads[score * n_samples + i] * w;
            out_grads[base + score] += g;
        }
        if let Some(hess) = hess {
            for score in 0..n_scores {
                let h = hess[score * n_samples + i] * w;
                out_hess[base + score] += h;
            }
        }
    }
}

/// Fold `planes` bin planes of `plane_len` values into the first plane.
pub fn reduce_planes<F: BinFloat>(data: &mut [F], plane_len: usize, planes: usize) {
    debug_assert!(data.len() >= plane_len * planes);
    if planes <= 1 || plane_len == 0 {
        return;
    }
    let (head, tail) = data.split_at_mut(plane_len);
    for plane in 0..planes - 1 {
        F::add_slices(head, &tail[plane * plane_len..][..plane_len]);
    }
}
