//! Data-independent partitioning for differentially-private boosting.
//!
//! Cut positions are drawn from the RNG without looking at the histogram, so
//! the partition reveals nothing about the data; privacy only requires that
//! splits be chosen independently of it. Leaf values and the reported gain
//! are still computed from the data afterwards, but the gain plays no part
//! in choosing splits. This is also the fallback for terms with more than
//! two real dimensions, where no exact joint search exists.

use crate::error::BoostError;
use crate::histogram::MainBins;
use crate::rng::SplitRng;
use crate::tensor::UpdateTensor;
use crate::term::Term;

use super::stats::{leaf_value, node_partial_gain, sanitize_gain, NodeStats, UpdateRules};

/// Sample cuts for every significant dimension, fill the inner update
/// tensor, and return the (data-derived, selection-irrelevant) gain.
pub fn partition_random_boosting(
    rng: &mut SplitRng,
    bins: &MainBins,
    term: &Term,
    leaves_max: &[usize],
    rules: &UpdateRules,
    inner: &mut UpdateTensor,
) -> Result<f64, BoostError> {
    let dims = term.count_dimensions();
    debug_assert_eq!(leaves_max.len(), dims);
    let n_scores = bins.n_scores();

    // Sample cuts per dimension; insignificant dimensions and dimensions
    // with a single-leaf budget get none.
    let mut all_cuts: Vec<Vec<usize>> = Vec::with_capacity(dims);
    for (d, &bins_d) in term.bin_counts().iter().enumerate() {
        let want = leaves_max[d].saturating_sub(1);
        let cuts = if bins_d < 2 || want == 0 {
            Vec::new()
        } else {
            rng.sample_distinct_sorted(1, bins_d, want)
        };
        all_cuts.push(cuts);
    }

    // Map every tensor bin onto its leaf cell and pool the statistics.
    let segment_counts: Vec<usize> = all_cuts.iter().map(|cuts| cuts.len() + 1).collect();
    let n_cells: usize = segment_counts.iter().product();
    let mut cells: Vec<NodeStats> = (0..n_cells).map(|_| NodeStats::zeros(n_scores)).collect();
    for bin in 0..term.count_tensor_bins() {
        let mut rem = bin;
        let mut cell = 0;
        let mut cell_stride = 1;
        for d in 0..dims {
            let bin_d = rem % term.bin_counts()[d];
            rem /= term.bin_counts()[d];
            let segment = all_cuts[d].partition_point(|&c| c <= bin_d);
            cell += segment * cell_stride;
            cell_stride *= segment_counts[d];
        }
        cells[cell].add_bin(bins, bin);
    }

    let mut parent = NodeStats::zeros(n_scores);
    for cell in &cells {
        parent.count += cell.count;
        parent.weight += cell.weight;
        for score in 0..n_scores {
            parent.grads[score] += cell.grads[score];
            parent.hess[score] += cell.hess[score];
        }
    }

    for (d, cuts) in all_cuts.iter().enumerate() {
        inner.set_cuts(d, cuts)?;
    }
    let values = inner.reset_values()?;
    debug_assert_eq!(values.len(), n_cells * n_scores);
    for (cell_index, cell) in cells.iter().enumerate() {
        for score in 0..n_scores {
            values[cell_index * n_scores + score] = leaf_value(rules, cell, score);
        }
    }

    // Refining a partition never lowers the sum-of-squares criterion, so the
    // delta is nonnegative up to rounding.
    let child_sum: f64 = cells.iter().map(|cell| node_partial_gain(rules, cell)).sum();
    let gain_delta = child_sum - node_partial_gain(rules, &parent);
    Ok(sanitize_gain(gain_delta.max(0.0)))
}
