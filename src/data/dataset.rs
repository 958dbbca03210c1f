//! The training set as the boosting core sees it.
//!
//! Raw loading and binning happen upstream; by the time a [`TrainingSet`]
//! exists, every sample is a tuple of per-feature bin indexes plus gradients
//! and hessians, partitioned into subsets. The set also owns the
//! per-(term, inner bag) `counts` and `weights` tensors the histogram
//! converter merges exactly once per bag, and the per-bag totals the
//! orchestrator divides gains by.

use crate::data::subset::DataSubset;

/// One bootstrap resampling of the training set.
///
/// `counts[i]` is how many times sample `i` occurs in the bag and
/// `weights[i]` its effective weight (occurrences times sample weight).
#[derive(Debug, Clone)]
pub struct InnerBag {
    counts: Vec<u64>,
    weights: Vec<f64>,
}

impl InnerBag {
    /// A bag from explicit per-sample occurrence counts and weights.
    pub fn new(counts: Vec<u64>, weights: Vec<f64>) -> Self {
        debug_assert_eq!(counts.len(), weights.len());
        Self { counts, weights }
    }

    /// The trivial bag: every sample once at unit weight.
    pub fn full(n_samples: usize) -> Self {
        Self { counts: vec![1; n_samples], weights: vec![1.0; n_samples] }
    }

    /// Per-sample occurrence counts.
    #[inline]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Per-sample effective weights.
    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// Precomputed per-tensor-bin totals for one (term, inner bag) pair.
///
/// The scatter stage only accumulates gradients; sample counts and weight
/// sums come from these tensors so they are added to the main bins exactly
/// once per bag regardless of how many subsets or planes fed the histogram.
#[derive(Debug, Clone)]
pub struct TermInnerBag {
    counts: Vec<u64>,
    weights: Vec<f64>,
}

impl TermInnerBag {
    pub(crate) fn from_bin_indexes(
        tensor_bins: usize,
        bin_indexes: &[usize],
        bag: &InnerBag,
    ) -> Self {
        let mut counts = vec![0u64; tensor_bins];
        let mut weights = vec![0.0f64; tensor_bins];
        for (i, &bin) in bin_indexes.iter().enumerate() {
            counts[bin] += bag.counts()[i];
            weights[bin] += bag.weights()[i];
        }
        Self { counts, weights }
    }

    pub(crate) fn collapsed(total: &BagTotal) -> Self {
        Self { counts: vec![total.count], weights: vec![total.weight] }
    }

    /// Per-tensor-bin sample counts.
    #[inline]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Per-tensor-bin weight sums.
    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// Whole-bag totals.
#[derive(Debug, Clone, Copy)]
pub struct BagTotal {
    pub count: u64,
    pub weight: f64,
}

/// Binned training data plus everything derived from the inner bags.
#[derive(Debug)]
pub struct TrainingSet {
    n_samples: usize,
    subsets: Vec<DataSubset>,
    /// Indexed `[term][bag]`.
    term_inner_bags: Vec<Vec<TermInnerBag>>,
    /// One-bin tensors used when a call collapses to a single tensor bin,
    /// indexed by bag.
    collapsed_bags: Vec<TermInnerBag>,
    bag_totals: Vec<BagTotal>,
}

impl TrainingSet {
    pub(crate) fn new(
        n_samples: usize,
        subsets: Vec<DataSubset>,
        term_inner_bags: Vec<Vec<TermInnerBag>>,
        bag_totals: Vec<BagTotal>,
    ) -> Self {
        let collapsed_bags = bag_totals.iter().map(TermInnerBag::collapsed).collect();
        Self { n_samples, subsets, term_inner_bags, collapsed_bags, bag_totals }
    }

    /// Total training samples across subsets.
    #[inline]
    pub fn count_samples(&self) -> usize {
        self.n_samples
    }

    /// The subsets in sample order.
    #[inline]
    pub fn subsets(&self) -> &[DataSubset] {
        &self.subsets
    }

    /// The counts/weights tensor for `(term, bag)`, or the collapsed one-bin
    /// tensor when the call is histogramming into a single bin.
    #[inline]
    pub fn term_bag(&self, collapsed: bool, term: usize, bag: usize) -> &TermInnerBag {
        if collapsed {
            &self.collapsed_bags[bag]
        } else {
            &self.term_inner_bags[term][bag]
        }
    }

    /// Whole-bag count/weight totals for `bag`.
    #[inline]
    pub fn bag_total(&self, bag: usize) -> BagTotal {
        self.bag_totals[bag]
    }

    /// Number of inner bags; at least 1 (the trivial full bag).
    #[inline]
    pub fn bag_count(&self) -> usize {
        self.bag_totals.len()
    }
}
