//! Joint split search over a two-dimensional histogram.
//!
//! Works on the prefix-sum ("totals") form of the tensor: the statistics of
//! any axis-aligned rectangle come from four corner lookups by
//! inclusion-exclusion, so the search over `(cut_x, cut_y)` pairs costs O(1)
//! per pair. The fixed-form search also considers the degenerate variants
//! that cut only one of the two axes, so a pair term whose second dimension
//! carries no signal ends up with a clean one-dimensional partition.

use crate::error::BoostError;
use crate::histogram::MainBins;
use crate::tensor::UpdateTensor;

use super::stats::{leaf_value, node_partial_gain, sanitize_gain, NodeStats, UpdateRules};

/// Location of one real dimension inside the term tensor.
#[derive(Debug, Clone, Copy)]
pub struct RealDimension {
    /// Index among the term's dimensions, for cut placement.
    pub dim: usize,
    /// Bin count.
    pub bins: usize,
    /// Linear stride inside the histogram tensor.
    pub stride: usize,
}

/// Reader for corner rectangles of a totals tensor.
struct Totals<'a> {
    bins: &'a MainBins,
    x: RealDimension,
    y: RealDimension,
}

impl Totals<'_> {
    /// Stats of the rectangle `[0..=x, 0..=y]`; either coordinate may be
    /// "before the start", contributing nothing.
    fn corner(&self, x: Option<usize>, y: Option<usize>) -> Option<(usize, f64)> {
        match (x, y) {
            (Some(x), Some(y)) => Some((x * self.x.stride + y * self.y.stride, 1.0)),
            _ => None,
        }
    }

    /// Stats of the rectangle `[x0..=x1] × [y0..=y1]` by inclusion-exclusion.
    fn rectangle(&self, x0: usize, x1: usize, y0: usize, y1: usize) -> NodeStats {
        let n_scores = self.bins.n_scores();
        let mut count = 0i128;
        let mut weight = 0.0f64;
        let mut grads = vec![0.0f64; n_scores];
        let mut hess = vec![0.0f64; n_scores];

        let corners = [
            self.corner(Some(x1), Some(y1)),
            self.corner(x0.checked_sub(1), Some(y1)).map(|(i, s)| (i, -s)),
            self.corner(Some(x1), y0.checked_sub(1)).map(|(i, s)| (i, -s)),
            self.corner(x0.checked_sub(1), y0.checked_sub(1)),
        ];
        for corner in corners.into_iter().flatten() {
            let (bin, sign) = corner;
            count += sign as i128 * self.bins.count(bin) as i128;
            weight += sign * self.bins.weight(bin);
            for score in 0..n_scores {
                grads[score] += sign * self.bins.grad(bin, score);
                if self.bins.has_hessian() {
                    hess[score] += sign * self.bins.hess(bin, score);
                }
            }
        }
        debug_assert!(count >= 0);
        NodeStats { count: count.max(0) as u64, weight, grads, hess }
    }
}

/// The winning fixed-form partition.
struct BestPartition {
    cut_x: Option<usize>,
    cut_y: Option<usize>,
    gain_delta: f64,
    regions: Vec<NodeStats>,
}

/// Search all single cuts and cut pairs over a totals tensor, fill the inner
/// update tensor, and return the gain.
///
/// `aux_start` is the bin offset of the pre-totals snapshot; debug builds
/// cross-check every reconstructed cell against it.
#[allow(clippy::too_many_arguments)]
pub fn partition_two_dimensional_boosting(
    bins: &MainBins,
    x: RealDimension,
    y: RealDimension,
    rules: &UpdateRules,
    min_samples_leaf: u64,
    hessian_min: f64,
    aux_start: usize,
    inner: &mut UpdateTensor,
) -> Result<f64, BoostError> {
    debug_assert!(x.bins >= 2 && y.bins >= 2);
    let totals = Totals { bins, x, y };
    debug_verify_totals(&totals, aux_start);

    let parent = totals.rectangle(0, x.bins - 1, 0, y.bins - 1);
    let parent_partial = node_partial_gain(rules, &parent);

    let mut best: Option<BestPartition> = None;
    let mut consider = |cut_x: Option<usize>, cut_y: Option<usize>| {
        let x_segments = segments(cut_x, x.bins);
        let y_segments = segments(cut_y, y.bins);

        let mut regions = Vec::with_capacity(x_segments.len() * y_segments.len());
        // Region order matches the update tensor's cell order: x fastest.
        for &(y0, y1) in &y_segments {
            for &(x0, x1) in &x_segments {
                let region = totals.rectangle(x0, x1, y0, y1);
                if region.count < min_samples_leaf
                    || !region.denoms_viable(rules, hessian_min)
                {
                    return;
                }
                regions.push(region);
            }
        }

        let child_sum: f64 =
            regions.iter().map(|region| node_partial_gain(rules, region)).sum();
        let gain_delta = child_sum - parent_partial;
        if gain_delta <= 0.0 {
            return;
        }
        if best.as_ref().map_or(true, |b| gain_delta > b.gain_delta) {
            best = Some(BestPartition { cut_x, cut_y, gain_delta, regions });
        }
    };

    for cut_x in 1..x.bins {
        consider(Some(cut_x), None);
    }
    for cut_y in 1..y.bins {
        consider(None, Some(cut_y));
    }
    for cut_x in 1..x.bins {
        for cut_y in 1..y.bins {
            consider(Some(cut_x), Some(cut_y));
        }
    }

    let n_scores = bins.n_scores();
    match best {
        Some(partition) => {
            let cuts_x: Vec<usize> = partition.cut_x.into_iter().collect();
            let cuts_y: Vec<usize> = partition.cut_y.into_iter().collect();
            inner.set_cuts(x.dim, &cuts_x)?;
            inner.set_cuts(y.dim, &cuts_y)?;
            let values = inner.reset_values()?;
            debug_assert_eq!(values.len(), partition.regions.len() * n_scores);
            for (cell, region) in partition.regions.iter().enumerate() {
                for score in 0..n_scores {
                    values[cell * n_scores + score] = leaf_value(rules, region, score);
                }
            }
            Ok(sanitize_gain(partition.gain_delta))
        }
        None => {
            // Nothing improves: one whole-tensor leaf, zero gain.
            inner.set_cuts(x.dim, &[])?;
            inner.set_cuts(y.dim, &[])?;
            let values = inner.reset_values()?;
            for score in 0..n_scores {
                values[score] = leaf_value(rules, &parent, score);
            }
            Ok(0.0)
        }
    }
}

/// Cross-check inclusion-exclusion over the totals against the pre-totals
/// snapshot in the auxiliary bins. Compiled out of release builds.
fn debug_verify_totals(totals: &Totals<'_>, aux_start: usize) {
    if !cfg!(debug_assertions) {
        return;
    }
    let bins = totals.bins;
    for j in 0..totals.y.bins {
        for i in 0..totals.x.bins {
            let cell = totals.rectangle(i, i, j, j);
            let aux = aux_start + i * totals.x.stride + j * totals.y.stride;
            debug_assert_eq!(cell.count, bins.count(aux));
            for score in 0..bins.n_scores() {
                let expected = bins.grad(aux, score);
                let tolerance = 1e-9 * expected.abs().max(cell.grads[score].abs()).max(1.0);
                debug_assert!(
                    !expected.is_finite() || (cell.grads[score] - expected).abs() <= tolerance
                );
            }
        }
    }
}

/// Inclusive bin ranges of the segments induced by an optional cut.
fn segments(cut: Option<usize>, bins: usize) -> Vec<(usize, usize)> {
    match cut {
        Some(cut) => vec![(0, cut - 1), (cut, bins - 1)],
        None => vec![(0, bins - 1)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::TermBoostFlags;
    use crate::histogram::tensor_totals;
    use approx::assert_abs_diff_eq;

    fn newton_rules() -> UpdateRules {
        UpdateRules::from_flags(TermBoostFlags::empty(), true)
    }

    /// 2x2 histogram from row-major (grad, hess, count) cells, already
    /// converted to totals.
    fn totals_2x2(cells: &[(f64, f64, u64); 4]) -> MainBins {
        let mut bins = MainBins::new(1, true);
        bins.ensure_bins(8);
        for (bin, &(g, h, c)) in cells.iter().enumerate() {
            bins.add_grad(bin, 0, g);
            bins.add_hess(bin, 0, h);
            bins.add_weight(bin, h);
            bins.add_count(bin, c);
        }
        tensor_totals(&[2, 2], &mut bins, Some(4));
        bins
    }

    fn run(bins: &MainBins, min_samples_leaf: u64) -> (UpdateTensor, f64) {
        let mut inner = UpdateTensor::new(1);
        inner.set_dimension_count(2);
        inner.reset();
        let gain = partition_two_dimensional_boosting(
            bins,
            RealDimension { dim: 0, bins: 2, stride: 1 },
            RealDimension { dim: 1, bins: 2, stride: 2 },
            &newton_rules(),
            min_samples_leaf,
            f64::MIN_POSITIVE,
            4,
            &mut inner,
        )
        .unwrap();
        (inner, gain)
    }

    #[test]
    fn test_single_axis_signal_cuts_one_dimension() {
        // Signal varies along x only: columns +1 / -1.
        let bins = totals_2x2(&[(1.0, 1.0, 1), (-1.0, 1.0, 1), (1.0, 1.0, 1), (-1.0, 1.0, 1)]);
        let (inner, gain) = run(&bins, 1);

        assert_eq!(inner.cuts(0), &[1]);
        assert!(inner.cuts(1).is_empty());
        assert_abs_diff_eq!(inner.values()[0], -1.0);
        assert_abs_diff_eq!(inner.values()[1], 1.0);
        // Children: (2)^2/2 each; parent 0.
        assert_abs_diff_eq!(gain, 4.0);
    }

    #[test]
    fn test_quadrant_signal_cuts_both_dimensions() {
        // XOR-ish pattern needs both cuts.
        let bins = totals_2x2(&[(2.0, 1.0, 1), (-2.0, 1.0, 1), (-2.0, 1.0, 1), (2.0, 1.0, 1)]);
        let (inner, gain) = run(&bins, 1);

        assert_eq!(inner.cuts(0), &[1]);
        assert_eq!(inner.cuts(1), &[1]);
        let values = inner.values();
        assert_abs_diff_eq!(values[0], -2.0);
        assert_abs_diff_eq!(values[1], 2.0);
        assert_abs_diff_eq!(values[2], 2.0);
        assert_abs_diff_eq!(values[3], -2.0);
        // Four quadrants at 4.0 partial each; no single-axis cut scores at all.
        assert_abs_diff_eq!(gain, 16.0);
    }

    #[test]
    fn test_min_samples_rejects_thin_quadrants() {
        let bins = totals_2x2(&[(2.0, 1.0, 1), (-2.0, 1.0, 1), (-2.0, 1.0, 1), (2.0, 1.0, 1)]);
        // Each quadrant holds one sample, so a minimum of two blocks the 2x2
        // form; each half holds two, so single-axis cuts survive the minimum
        // but carry zero gain here, leaving the tensor uncut.
        let (inner, gain) = run(&bins, 2);
        assert!(inner.cuts(0).is_empty());
        assert!(inner.cuts(1).is_empty());
        assert_eq!(gain, 0.0);
        assert_abs_diff_eq!(inner.values()[0], 0.0);
    }

    #[test]
    fn test_rectangle_reader_matches_cells() {
        let bins = totals_2x2(&[(1.0, 1.0, 1), (2.0, 1.0, 2), (3.0, 1.0, 3), (4.0, 1.0, 4)]);
        let totals = Totals {
            bins: &bins,
            x: RealDimension { dim: 0, bins: 2, stride: 1 },
            y: RealDimension { dim: 1, bins: 2, stride: 2 },
        };
        let cell = totals.rectangle(1, 1, 1, 1);
        assert_abs_diff_eq!(cell.grads[0], 4.0);
        assert_eq!(cell.count, 4);

        let right_column = totals.rectangle(1, 1, 0, 1);
        assert_abs_diff_eq!(right_column.grads[0], 6.0);
        assert_eq!(right_column.count, 6);

        let all = totals.rectangle(0, 1, 0, 1);
        assert_abs_diff_eq!(all.grads[0], 10.0);
        assert_eq!(all.count, 10);
    }

    #[test]
    fn test_wider_tensor_prefers_best_pair() {
        // 3x2 tensor; the x signal changes after bin 1 and y splits the
        // leftover noise.
        let mut bins = MainBins::new(1, true);
        bins.ensure_bins(12);
        let cells = [
            (3.0, 1.0), // (0,0)
            (3.0, 1.0), // (1,0)
            (-3.0, 1.0), // (2,0)
            (1.0, 1.0), // (0,1)
            (1.0, 1.0), // (1,1)
            (-5.0, 1.0), // (2,1)
        ];
        for (bin, &(g, h)) in cells.iter().enumerate() {
            bins.add_grad(bin, 0, g);
            bins.add_hess(bin, 0, h);
            bins.add_weight(bin, h);
            bins.add_count(bin, 1);
        }
        tensor_totals(&[3, 2], &mut bins, Some(6));

        let mut inner = UpdateTensor::new(1);
        inner.set_dimension_count(2);
        inner.reset();
        let gain = partition_two_dimensional_boosting(
            &bins,
            RealDimension { dim: 0, bins: 3, stride: 1 },
            RealDimension { dim: 1, bins: 2, stride: 3 },
            &newton_rules(),
            1,
            f64::MIN_POSITIVE,
            6,
            &mut inner,
        )
        .unwrap();

        assert_eq!(inner.cuts(0), &[2]);
        assert_eq!(inner.cuts(1), &[1]);
        assert!(gain > 0.0);
        // Cells x-fastest: (left,y0), (right,y0), (left,y1), (right,y1).
        let values = inner.values();
        assert_abs_diff_eq!(values[0], -3.0);
        assert_abs_diff_eq!(values[1], 3.0);
        assert_abs_diff_eq!(values[2], -1.0);
        assert_abs_diff_eq!(values[3], 5.0);
    }
}
