//! Multidimensional prefix sums over the histogram tensor.
//!
//! After this pass, bin `(i_0, …, i_{d-1})` holds the sum of every original
//! bin `(j_0, …, j_{d-1})` with `j_k ≤ i_k` for all `k`, so the
//! two-dimensional partitioner can read any corner rectangle in O(1) and any
//! sub-rectangle by inclusion-exclusion. Applied stripe-by-stripe per
//! dimension; the order across dimensions does not matter.

use super::MainBins;

/// Transform the first `Π dims` bins of `bins` into their prefix sums,
/// in place.
///
/// `dims` are the term's per-dimension bin counts in tensor order
/// (dimension 0 has stride 1); size-1 dimensions contribute nothing and are
/// skipped. When `aux_start` is given, the untouched histogram is first
/// copied to that bin offset so callers keep a readable snapshot.
pub fn tensor_totals(dims: &[usize], bins: &mut MainBins, aux_start: Option<usize>) {
    let total: usize = dims.iter().product();
    if let Some(aux_start) = aux_start {
        bins.snapshot(total, aux_start);
    }

    let mut stride = 1;
    for &dim in dims {
        if dim > 1 {
            // Within each stripe along this dimension, a running sum; a cell
            // whose digit is nonzero accumulates its predecessor, which this
            // same pass already finished.
            for i in 0..total {
                if (i / stride) % dim != 0 {
                    bins.accumulate_bin(i, i - stride);
                }
            }
        }
        stride *= dim;
    }
}
