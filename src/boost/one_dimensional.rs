//! Greedy best-first partitioning of a one-dimensional histogram.
//!
//! Each node (a contiguous bin range) knows its single best split; a
//! priority queue orders nodes by that split's gain improvement. Committing
//! the best node replaces it with two children whose own best splits go back
//! on the queue, until the split budget is exhausted or nothing improves.
//!
//! Exact gain ties between candidate positions inside one node are broken
//! with the RNG so degenerate data does not systematically favor the left
//! scan order. Monotone constraints are enforced by rejecting candidates
//! whose child values disobey the direction or escape the interval bounds
//! inherited from ancestor splits.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::BoostError;
use crate::flags::MonotoneDirection;
use crate::histogram::MainBins;
use crate::rng::SplitRng;
use crate::tensor::UpdateTensor;

use super::stats::{leaf_value, node_partial_gain, sanitize_gain, NodeStats, UpdateRules};

/// One committable split inside a node.
#[derive(Debug, Clone)]
struct Candidate {
    /// Split sits before this bin.
    cut: usize,
    /// Gain improvement over leaving the node whole.
    gain_delta: f64,
    left: NodeStats,
    right: NodeStats,
    /// Score-0 child values, used to tighten monotone bounds downstream.
    left_value: f64,
    right_value: f64,
}

/// A contiguous bin range with its statistics and monotone bounds.
#[derive(Debug, Clone)]
struct Node {
    first: usize,
    last: usize,
    stats: NodeStats,
    lower: f64,
    upper: f64,
    best: Option<Candidate>,
}

/// Heap entry ordering: larger gain first, then insertion order so equal
/// gains pop deterministically.
struct HeapEntry {
    gain_delta: f64,
    seq: u64,
    node: Node,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gain_delta
            .total_cmp(&other.gain_delta)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Find up to `splits_max` splits over `n_bins` bins, fill the inner update
/// tensor's cuts and values on dimension `dim`, and return the total gain.
#[allow(clippy::too_many_arguments)]
pub fn partition_one_dimensional_boosting(
    rng: &mut SplitRng,
    bins: &MainBins,
    n_bins: usize,
    dim: usize,
    rules: &UpdateRules,
    min_samples_leaf: u64,
    hessian_min: f64,
    splits_max: usize,
    direction: MonotoneDirection,
    inner: &mut UpdateTensor,
) -> Result<f64, BoostError> {
    debug_assert!(n_bins >= 2);
    debug_assert!(splits_max >= 1);

    let n_scores = bins.n_scores();
    let mut root_stats = NodeStats::zeros(n_scores);
    for bin in 0..n_bins {
        root_stats.add_bin(bins, bin);
    }
    let mut root = Node {
        first: 0,
        last: n_bins,
        stats: root_stats,
        lower: f64::NEG_INFINITY,
        upper: f64::INFINITY,
        best: None,
    };
    find_best_split(rng, bins, &mut root, rules, min_samples_leaf, hessian_min, direction);

    let mut heap = BinaryHeap::new();
    let mut leaves: Vec<Node> = Vec::new();
    let mut seq = 0u64;
    let mut push = |heap: &mut BinaryHeap<HeapEntry>, leaves: &mut Vec<Node>, node: Node| {
        let gain_delta = match &node.best {
            Some(candidate) => candidate.gain_delta,
            None => {
                leaves.push(node);
                return;
            }
        };
        heap.push(HeapEntry { gain_delta, seq, node });
        seq += 1;
    };
    push(&mut heap, &mut leaves, root);

    let mut cuts: Vec<usize> = Vec::new();
    let mut total_gain = 0.0;
    while cuts.len() < splits_max {
        let Some(entry) = heap.pop() else {
            break;
        };
        let node = entry.node;
        let Some(candidate) = node.best.clone() else {
            break;
        };

        cuts.push(candidate.cut);
        total_gain += candidate.gain_delta;

        let (left_bounds, right_bounds) =
            child_bounds(direction, node.lower, node.upper, &candidate);
        let mut left = Node {
            first: node.first,
            last: candidate.cut,
            stats: candidate.left,
            lower: left_bounds.0,
            upper: left_bounds.1,
            best: None,
        };
        let mut right = Node {
            first: candidate.cut,
            last: node.last,
            stats: candidate.right,
            lower: right_bounds.0,
            upper: right_bounds.1,
            best: None,
        };
        find_best_split(rng, bins, &mut left, rules, min_samples_leaf, hessian_min, direction);
        find_best_split(rng, bins, &mut right, rules, min_samples_leaf, hessian_min, direction);
        push(&mut heap, &mut leaves, left);
        push(&mut heap, &mut leaves, right);
    }
    // Whatever still sits on the heap keeps its range whole.
    leaves.extend(heap.into_iter().map(|entry| entry.node));
    leaves.sort_unstable_by_key(|leaf| leaf.first);
    cuts.sort_unstable();

    inner.set_cuts(dim, &cuts)?;
    let values = inner.reset_values()?;
    debug_assert_eq!(values.len(), leaves.len() * n_scores);
    for (leaf_index, leaf) in leaves.iter().enumerate() {
        for score in 0..n_scores {
            values[leaf_index * n_scores + score] = leaf_value(rules, &leaf.stats, score);
        }
    }

    Ok(sanitize_gain(total_gain))
}

/// Scan every adjacent split position in `node` and record the best viable
/// candidate, if any improves on leaving the node whole.
fn find_best_split(
    rng: &mut SplitRng,
    bins: &MainBins,
    node: &mut Node,
    rules: &UpdateRules,
    min_samples_leaf: u64,
    hessian_min: f64,
    direction: MonotoneDirection,
) {
    node.best = None;
    if node.last - node.first < 2 {
        return;
    }

    let n_scores = bins.n_scores();
    let parent_partial = node_partial_gain(rules, &node.stats);

    let mut left = NodeStats::zeros(n_scores);
    let mut best: Option<Candidate> = None;
    for cut in node.first + 1..node.last {
        left.add_bin(bins, cut - 1);
        let right = node.stats.minus(&left);

        if left.count < min_samples_leaf || right.count < min_samples_leaf {
            continue;
        }
        if !left.denoms_viable(rules, hessian_min) || !right.denoms_viable(rules, hessian_min) {
            continue;
        }
        if direction.is_constrained() && !monotone_ok(rules, &left, &right, node, direction) {
            continue;
        }

        let child_sum = node_partial_gain(rules, &left) + node_partial_gain(rules, &right);
        let gain_delta = child_sum - parent_partial;
        if gain_delta <= 0.0 {
            continue;
        }

        let better = match &best {
            None => true,
            Some(best) => match gain_delta.total_cmp(&best.gain_delta) {
                Ordering::Greater => true,
                Ordering::Equal => rng.flip(),
                Ordering::Less => false,
            },
        };
        if better {
            best = Some(Candidate {
                cut,
                gain_delta,
                left_value: leaf_value(rules, &left, 0),
                right_value: leaf_value(rules, &right, 0),
                left: left.clone(),
                right,
            });
        }
    }
    node.best = best;
}

/// Every score's child values must obey the direction and stay inside the
/// node's inherited interval.
fn monotone_ok(
    rules: &UpdateRules,
    left: &NodeStats,
    right: &NodeStats,
    node: &Node,
    direction: MonotoneDirection,
) -> bool {
    for score in 0..left.grads.len() {
        let left_value = leaf_value(rules, left, score);
        let right_value = leaf_value(rules, right, score);
        if !direction.allows(left_value, right_value) {
            return false;
        }
        if left_value < node.lower
            || left_value > node.upper
            || right_value < node.lower
            || right_value > node.upper
        {
            return false;
        }
    }
    true
}

/// Interval bounds the children inherit after committing a monotone split.
fn child_bounds(
    direction: MonotoneDirection,
    lower: f64,
    upper: f64,
    candidate: &Candidate,
) -> ((f64, f64), (f64, f64)) {
    match direction {
        MonotoneDirection::None => ((lower, upper), (lower, upper)),
        MonotoneDirection::Increasing => {
            let mid = 0.5 * (candidate.left_value + candidate.right_value);
            ((lower, upper.min(mid)), (lower.max(mid), upper))
        }
        MonotoneDirection::Decreasing => {
            let mid = 0.5 * (candidate.left_value + candidate.right_value);
            ((lower.max(mid), upper), (lower, upper.min(mid)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::TermBoostFlags;
    use approx::assert_abs_diff_eq;

    fn newton_rules() -> UpdateRules {
        UpdateRules::from_flags(TermBoostFlags::empty(), true)
    }

    /// Build a 1-score histogram from per-bin (grad, hess, weight, count).
    fn histogram(cells: &[(f64, f64, f64, u64)]) -> MainBins {
        let mut bins = MainBins::new(1, true);
        bins.ensure_bins(cells.len());
        for (bin, &(g, h, w, c)) in cells.iter().enumerate() {
            bins.add_grad(bin, 0, g);
            bins.add_hess(bin, 0, h);
            bins.add_weight(bin, w);
            bins.add_count(bin, c);
        }
        bins
    }

    fn run(
        bins: &MainBins,
        n_bins: usize,
        min_samples_leaf: u64,
        splits_max: usize,
        direction: MonotoneDirection,
    ) -> (UpdateTensor, f64) {
        let mut rng = SplitRng::seed_from_u64(7);
        let mut inner = UpdateTensor::new(1);
        inner.set_dimension_count(1);
        inner.reset();
        let gain = partition_one_dimensional_boosting(
            &mut rng,
            bins,
            n_bins,
            0,
            &newton_rules(),
            min_samples_leaf,
            f64::MIN_POSITIVE,
            splits_max,
            direction,
            &mut inner,
        )
        .unwrap();
        (inner, gain)
    }

    #[test]
    fn test_perfect_separation_single_split() {
        // Left bin: 5 samples of g=+2, h=1. Right bin: 5 samples of g=-2, h=1.
        let bins = histogram(&[(10.0, 5.0, 5.0, 5), (-10.0, 5.0, 5.0, 5)]);
        let (inner, gain) = run(&bins, 2, 1, 1, MonotoneDirection::None);

        assert_eq!(inner.cuts(0), &[1]);
        assert_abs_diff_eq!(inner.values()[0], -2.0);
        assert_abs_diff_eq!(inner.values()[1], 2.0);
        // Children partials 100/5 + 100/5, parent partial 0.
        assert_abs_diff_eq!(gain, 40.0);
    }

    #[test]
    fn test_min_samples_blocks_all_splits() {
        let bins = histogram(&[(10.0, 5.0, 5.0, 5), (-10.0, 5.0, 5.0, 5)]);
        let (inner, gain) = run(&bins, 2, 6, 1, MonotoneDirection::None);

        assert!(inner.cuts(0).is_empty());
        assert_eq!(gain, 0.0);
        // The single leaf behaves like a zero-dimensional boost.
        assert_abs_diff_eq!(inner.values()[0], -0.0 / 10.0);
    }

    #[test]
    fn test_hessian_min_blocks_thin_children() {
        let bins = histogram(&[(1.0, 0.1, 1.0, 5), (-1.0, 0.1, 1.0, 5)]);
        let mut rng = SplitRng::seed_from_u64(7);
        let mut inner = UpdateTensor::new(1);
        inner.set_dimension_count(1);
        inner.reset();
        let gain = partition_one_dimensional_boosting(
            &mut rng,
            &bins,
            2,
            0,
            &newton_rules(),
            1,
            0.5,
            1,
            MonotoneDirection::None,
            &mut inner,
        )
        .unwrap();
        assert!(inner.cuts(0).is_empty());
        assert_eq!(gain, 0.0);
    }

    #[test]
    fn test_best_first_commits_highest_gain_first() {
        // Three regimes over four bins; two splits allowed, and the big jump
        // between bins 1 and 2 must be taken.
        let bins = histogram(&[
            (4.0, 2.0, 2.0, 2),
            (5.0, 2.0, 2.0, 2),
            (-5.0, 2.0, 2.0, 2),
            (-4.0, 2.0, 2.0, 2),
        ]);
        let (inner, gain) = run(&bins, 4, 1, 1, MonotoneDirection::None);
        assert_eq!(inner.cuts(0), &[2]);
        assert!(gain > 0.0);

        let (inner, _) = run(&bins, 4, 1, 3, MonotoneDirection::None);
        // With budget to spare, the smaller refinements land too.
        assert_eq!(inner.cuts(0), &[1, 2, 3]);
    }

    #[test]
    fn test_leaf_size_enforced_on_committed_splits() {
        let bins = histogram(&[
            (3.0, 1.0, 1.0, 1),
            (2.0, 2.0, 2.0, 2),
            (-2.0, 2.0, 2.0, 2),
            (-3.0, 1.0, 1.0, 1),
        ]);
        let (inner, _) = run(&bins, 4, 2, 3, MonotoneDirection::None);
        // Only the middle cut keeps both children at >= 2 samples.
        assert_eq!(inner.cuts(0), &[2]);
    }

    #[test]
    fn test_monotone_rejects_decreasing_leaves() {
        // The only split produces +2 then -2, which violates `Increasing`.
        let bins = histogram(&[(-10.0, 5.0, 5.0, 5), (10.0, 5.0, 5.0, 5)]);
        let (inner, gain) = run(&bins, 2, 1, 1, MonotoneDirection::Increasing);
        assert!(inner.cuts(0).is_empty());
        assert_eq!(gain, 0.0);

        // The same histogram splits fine when the direction matches.
        let (inner, gain) = run(&bins, 2, 1, 1, MonotoneDirection::Decreasing);
        assert_eq!(inner.cuts(0), &[1]);
        assert!(gain > 0.0);
    }

    #[test]
    fn test_monotone_bounds_propagate_across_splits() {
        // Values by bin: +3, +1, -1, -3 (decreasing). Ask for increasing:
        // nothing may split. Ask for decreasing: all splits land and leaves
        // are ordered.
        let bins = histogram(&[
            (-3.0, 1.0, 1.0, 2),
            (-1.0, 1.0, 1.0, 2),
            (1.0, 1.0, 1.0, 2),
            (3.0, 1.0, 1.0, 2),
        ]);
        let (inner, _) = run(&bins, 4, 1, 3, MonotoneDirection::Decreasing);
        assert_eq!(inner.cuts(0), &[1, 2, 3]);
        let values = inner.values();
        assert!(values.windows(2).all(|w| w[0] >= w[1]));

        let (inner, gain) = run(&bins, 4, 1, 3, MonotoneDirection::Increasing);
        assert!(inner.cuts(0).is_empty());
        assert_eq!(gain, 0.0);
    }

    #[test]
    fn test_tie_break_is_seed_deterministic() {
        // Symmetric histogram with two equally good cuts.
        let bins = histogram(&[
            (6.0, 2.0, 2.0, 2),
            (0.0, 2.0, 2.0, 2),
            (-6.0, 2.0, 2.0, 2),
        ]);
        let runs: Vec<Vec<usize>> = (0..4)
            .map(|_| {
                let mut rng = SplitRng::seed_from_u64(99);
                let mut inner = UpdateTensor::new(1);
                inner.set_dimension_count(1);
                inner.reset();
                partition_one_dimensional_boosting(
                    &mut rng,
                    &bins,
                    3,
                    0,
                    &newton_rules(),
                    1,
                    f64::MIN_POSITIVE,
                    1,
                    MonotoneDirection::None,
                    &mut inner,
                )
                .unwrap();
                inner.cuts(0).to_vec()
            })
            .collect();
        assert!(runs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_multiscore_updates_every_score() {
        let mut bins = MainBins::new(2, true);
        bins.ensure_bins(2);
        for (bin, sign) in [(0usize, 1.0f64), (1, -1.0)] {
            bins.add_count(bin, 4);
            bins.add_weight(bin, 4.0);
            bins.add_grad(bin, 0, 2.0 * sign);
            bins.add_grad(bin, 1, -2.0 * sign);
            bins.add_hess(bin, 0, 4.0);
            bins.add_hess(bin, 1, 4.0);
        }
        let mut rng = SplitRng::seed_from_u64(1);
        let mut inner = UpdateTensor::new(2);
        inner.set_dimension_count(1);
        inner.reset();
        let gain = partition_one_dimensional_boosting(
            &mut rng,
            &bins,
            2,
            0,
            &newton_rules(),
            1,
            f64::MIN_POSITIVE,
            1,
            MonotoneDirection::None,
            &mut inner,
        )
        .unwrap();
        assert_eq!(inner.cuts(0), &[1]);
        let values = inner.values();
        assert_abs_diff_eq!(values[0], -0.5);
        assert_abs_diff_eq!(values[1], 0.5);
        assert_abs_diff_eq!(values[2], 0.5);
        assert_abs_diff_eq!(values[3], -0.5);
        assert!(gain > 0.0);
    }
}
