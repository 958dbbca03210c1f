//! Booster state: the immutable core and the reusable shell.
//!
//! A [`BoosterCore`] owns everything fixed across boosting rounds: the
//! objective constants, feature and term metadata, and the binned training
//! set with its inner bags. A [`BoosterShell`] wraps a core together with
//! the buffers one term update needs (fast-bin scratch, main-bin tensor,
//! and the two update tensors), which live across calls and are zeroed
//! region-by-region on use. A shell is single-threaded and not re-entrant;
//! run concurrent boosters on disjoint shells.

use log::Level;

use crate::data::{
    BagTotal, DataSubset, InnerBag, PackedIndexes, SubsetCaps, TermInnerBag, TrainingSet,
};
use crate::error::BoostError;
use crate::flags::{MonotoneDirection, TermBoostFlags};
use crate::histogram::{FastBinScratch, MainBins};
use crate::logging::LogCounter;
use crate::rng::SplitRng;
use crate::tensor::UpdateTensor;
use crate::term::{Feature, Term};

/// How many shell-level entry log lines are emitted at `Info`.
const SHELL_LOG_LIMIT: u32 = 10;

// ============================================================================
// BoosterConfig
// ============================================================================

/// Objective-derived constants and tuning knobs, fixed for a booster's
/// lifetime.
#[derive(Debug, Clone)]
pub struct BoosterConfig {
    /// Per-sample score dimensions: 1 for regression, 2 for binary
    /// classification under the symmetric-logit convention, K for
    /// multiclass. Zero is legal and makes every update trivially empty.
    pub n_scores: usize,
    /// Whether the objective supplies hessians. Without them, every
    /// denominator falls back to the weight sum.
    pub has_hessian: bool,
    /// Objective gradient scale, folded into update and gain multiples.
    pub gradient_constant: f64,
    /// Objective hessian scale, divided out of Newton updates and gains.
    pub hessian_constant: f64,
    /// Learning-rate adjustment applied in gradient-sums (DP) mode.
    pub learning_rate_adjustment_differential_privacy: f64,
    /// Learning-rate adjustment applied when Newton updates are disabled.
    pub learning_rate_adjustment_gradient_boosting: f64,
    /// Learning-rate adjustment applied for Newton (hessian) updates.
    pub learning_rate_adjustment_hessian_boosting: f64,
    /// Gain adjustment when Newton gain is disabled.
    pub gain_adjustment_gradient_boosting: f64,
    /// Gain adjustment for Newton (hessian) gain.
    pub gain_adjustment_hessian_boosting: f64,
}

impl Default for BoosterConfig {
    fn default() -> Self {
        Self {
            n_scores: 1,
            has_hessian: true,
            gradient_constant: 1.0,
            hessian_constant: 1.0,
            learning_rate_adjustment_differential_privacy: 1.0,
            learning_rate_adjustment_gradient_boosting: 1.0,
            learning_rate_adjustment_hessian_boosting: 1.0,
            gain_adjustment_gradient_boosting: 1.0,
            gain_adjustment_hessian_boosting: 1.0,
        }
    }
}

// ============================================================================
// BoosterCore
// ============================================================================

/// Immutable booster state shared by every call on a shell.
#[derive(Debug)]
pub struct BoosterCore {
    config: BoosterConfig,
    features: Vec<Feature>,
    terms: Vec<Term>,
    training: TrainingSet,
}

impl BoosterCore {
    /// Start building a core.
    pub fn builder(config: BoosterConfig) -> BoosterCoreBuilder {
        BoosterCoreBuilder::new(config)
    }

    #[inline]
    pub fn config(&self) -> &BoosterConfig {
        &self.config
    }

    #[inline]
    pub fn count_scores(&self) -> usize {
        self.config.n_scores
    }

    #[inline]
    pub fn is_hessian(&self) -> bool {
        self.config.has_hessian
    }

    #[inline]
    pub fn count_terms(&self) -> usize {
        self.terms.len()
    }

    #[inline]
    pub fn term(&self, index: usize) -> &Term {
        &self.terms[index]
    }

    #[inline]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    #[inline]
    pub fn training(&self) -> &TrainingSet {
        &self.training
    }
}

// ============================================================================
// BoosterCoreBuilder
// ============================================================================

/// Assembles a [`BoosterCore`] from binned features, terms, gradients, and
/// inner bags, deriving the packed columns and per-bag tensors the update
/// loop reads.
#[derive(Debug)]
pub struct BoosterCoreBuilder {
    config: BoosterConfig,
    features: Vec<Feature>,
    /// Per feature: each sample's bin index.
    sample_bins: Vec<Vec<usize>>,
    terms: Vec<Vec<usize>>,
    grads: Vec<f64>,
    hess: Option<Vec<f64>>,
    inner_bags: Vec<InnerBag>,
    /// Optional subset layout: (sample count, caps) per subset, in order.
    subset_layout: Option<Vec<(usize, SubsetCaps)>>,
}

impl BoosterCoreBuilder {
    pub fn new(config: BoosterConfig) -> Self {
        Self {
            config,
            features: Vec::new(),
            sample_bins: Vec::new(),
            terms: Vec::new(),
            grads: Vec::new(),
            hess: None,
            inner_bags: Vec::new(),
            subset_layout: None,
        }
    }

    /// Register a feature with `bins` bins and every sample's bin index.
    /// Returns the feature's index.
    pub fn add_feature(&mut self, bins: usize, bin_indexes: Vec<usize>) -> usize {
        self.features.push(Feature::new(bins));
        self.sample_bins.push(bin_indexes);
        self.features.len() - 1
    }

    /// Register a term over previously added features. Returns the term's
    /// index.
    pub fn add_term(&mut self, feature_indexes: &[usize]) -> usize {
        self.terms.push(feature_indexes.to_vec());
        self.terms.len() - 1
    }

    /// Score-major gradients: `grads[score * n_samples + sample]`.
    pub fn gradients(&mut self, grads: Vec<f64>) -> &mut Self {
        self.grads = grads;
        self
    }

    /// Score-major hessians, required iff the config enables them.
    pub fn hessians(&mut self, hess: Vec<f64>) -> &mut Self {
        self.hess = Some(hess);
        self
    }

    /// Add one inner bag. Without any, a single full bag is assumed.
    pub fn add_inner_bag(&mut self, bag: InnerBag) -> &mut Self {
        self.inner_bags.push(bag);
        self
    }

    /// Partition the samples into subsets with explicit capability records.
    /// Counts must sum to the sample count. Without this, one wide subset
    /// covers everything.
    pub fn subset_layout(&mut self, layout: Vec<(usize, SubsetCaps)>) -> &mut Self {
        self.subset_layout = Some(layout);
        self
    }

    pub fn build(self) -> Result<BoosterCore, BoostError> {
        let n_scores = self.config.n_scores;

        // Sample count comes from the features; a featureless core falls
        // back to the gradients.
        let n_samples = match self.sample_bins.first() {
            Some(bins) => bins.len(),
            None if n_scores > 0 => self.grads.len() / n_scores,
            None => 0,
        };
        for (feature_index, bins) in self.sample_bins.iter().enumerate() {
            if bins.len() != n_samples {
                return Err(BoostError::IllegalParamVal("feature sample count mismatch"));
            }
            let n_bins = self.features[feature_index].count_bins();
            if bins.iter().any(|&bin| bin >= n_bins) {
                return Err(BoostError::IllegalParamVal("sample bin index out of range"));
            }
        }
        if self.grads.len() != n_samples * n_scores {
            return Err(BoostError::IllegalParamVal("gradient length mismatch"));
        }
        match (&self.hess, self.config.has_hessian) {
            (Some(hess), true) if hess.len() != self.grads.len() => {
                return Err(BoostError::IllegalParamVal("hessian length mismatch"));
            }
            (None, true) if n_samples > 0 && n_scores > 0 => {
                return Err(BoostError::IllegalParamVal("hessian objective without hessians"));
            }
            (Some(_), false) => {
                return Err(BoostError::IllegalParamVal("hessians on a gradient-only objective"));
            }
            _ => {}
        }

        let terms = self
            .terms
            .iter()
            .map(|feature_indexes| Term::new(&self.features, feature_indexes.clone()))
            .collect::<Result<Vec<Term>, BoostError>>()?;

        // Per-term tensor index of every sample.
        let mut term_bins: Vec<Vec<usize>> = Vec::with_capacity(terms.len());
        let mut scratch_indexes = Vec::new();
        for term in &terms {
            let mut bins = Vec::with_capacity(n_samples);
            for sample in 0..n_samples {
                scratch_indexes.clear();
                scratch_indexes.extend(
                    term.feature_indexes().iter().map(|&f| self.sample_bins[f][sample]),
                );
                bins.push(term.tensor_index(&scratch_indexes));
            }
            term_bins.push(bins);
        }

        let inner_bags = if self.inner_bags.is_empty() {
            vec![InnerBag::full(n_samples)]
        } else {
            self.inner_bags
        };
        let mut bag_totals = Vec::with_capacity(inner_bags.len());
        for bag in &inner_bags {
            if bag.counts().len() != n_samples {
                return Err(BoostError::IllegalParamVal("inner bag sample count mismatch"));
            }
            let count: u64 = bag.counts().iter().sum();
            let mut weight: f64 = bag.weights().iter().sum();
            if weight == 0.0 {
                // All-zero weights mean "unweighted"; gains divide by the
                // sample count instead.
                weight = count as f64;
            }
            bag_totals.push(BagTotal { count, weight });
        }

        let layout = self
            .subset_layout
            .unwrap_or_else(|| vec![(n_samples, SubsetCaps::wide(self.config.has_hessian))]);
        if layout.iter().map(|&(count, _)| count).sum::<usize>() != n_samples {
            return Err(BoostError::IllegalParamVal("subset layout does not cover the samples"));
        }

        let mut subsets = Vec::with_capacity(layout.len());
        let mut start = 0usize;
        for &(count, caps) in &layout {
            if caps.has_hessian != self.config.has_hessian {
                return Err(BoostError::IllegalParamVal("subset hessian capability mismatch"));
            }
            let range = start..start + count;

            // Re-slice score-major storage for this subset's samples.
            let mut grads = Vec::with_capacity(count * n_scores);
            let mut hess = self.hess.as_ref().map(|_| Vec::with_capacity(count * n_scores));
            for score in 0..n_scores {
                let base = score * n_samples;
                grads.extend_from_slice(&self.grads[base + range.start..base + range.end]);
                if let (Some(out), Some(all)) = (&mut hess, &self.hess) {
                    out.extend_from_slice(&all[base + range.start..base + range.end]);
                }
            }
            let mut subset = DataSubset::new(caps, n_scores, count, &grads, hess.as_deref());

            for (term, bins) in terms.iter().zip(&term_bins) {
                let packed = PackedIndexes::pack(
                    &bins[range.clone()],
                    term.bits_required(),
                    caps.uint_width,
                )?;
                subset.push_term_indexes(packed);
            }
            for bag in &inner_bags {
                subset.push_bag_weights(&bag.weights()[range.clone()]);
            }

            subsets.push(subset);
            start += count;
        }

        let mut term_inner_bags = Vec::with_capacity(terms.len());
        for (term, bins) in terms.iter().zip(&term_bins) {
            let per_bag: Vec<TermInnerBag> = inner_bags
                .iter()
                .map(|bag| TermInnerBag::from_bin_indexes(term.count_tensor_bins(), bins, bag))
                .collect();
            term_inner_bags.push(per_bag);
        }

        let training = TrainingSet::new(n_samples, subsets, term_inner_bags, bag_totals);
        Ok(BoosterCore { config: self.config, features: self.features, terms, training })
    }
}

// ============================================================================
// BoosterShell
// ============================================================================

/// A core plus the reusable buffers of the term-update loop.
#[derive(Debug)]
pub struct BoosterShell {
    pub(crate) core: BoosterCore,
    /// Committed term index; `None` until a call succeeds, and cleared at
    /// the start of every call so errors can never leave a stale index.
    pub(crate) term_index: Option<usize>,
    pub(crate) fast_bins: FastBinScratch,
    pub(crate) main_bins: MainBins,
    pub(crate) term_update: UpdateTensor,
    pub(crate) inner_term_update: UpdateTensor,
    pub(crate) log_generate: LogCounter,
}

impl BoosterShell {
    pub fn new(core: BoosterCore) -> Self {
        let n_scores = core.count_scores().max(1);
        let has_hessian = core.is_hessian();
        Self {
            core,
            term_index: None,
            fast_bins: FastBinScratch::new(),
            main_bins: MainBins::new(n_scores, has_hessian),
            term_update: UpdateTensor::new(n_scores),
            inner_term_update: UpdateTensor::new(n_scores),
            log_generate: LogCounter::new(SHELL_LOG_LIMIT, Level::Info),
        }
    }

    #[inline]
    pub fn core(&self) -> &BoosterCore {
        &self.core
    }

    /// The term the current update tensor belongs to, once a call succeeds.
    #[inline]
    pub fn term_index(&self) -> Option<usize> {
        self.term_index
    }

    /// The accumulated, scaled update produced by the last call.
    #[inline]
    pub fn term_update(&self) -> &UpdateTensor {
        &self.term_update
    }

    /// Mutable access for the apply step that follows boosting.
    #[inline]
    pub fn term_update_mut(&mut self) -> &mut UpdateTensor {
        &mut self.term_update
    }

    /// Generate the update for one term; see
    /// [`generate_term_update`](crate::boost::generate_term_update).
    #[allow(clippy::too_many_arguments)]
    pub fn generate_term_update(
        &mut self,
        rng: Option<&mut SplitRng>,
        term_index: usize,
        flags: TermBoostFlags,
        learning_rate: f64,
        min_samples_leaf: u64,
        min_hessian: f64,
        leaves_max: Option<&[usize]>,
        direction: Option<&[MonotoneDirection]>,
    ) -> Result<f64, BoostError> {
        crate::boost::generate_term_update(
            rng,
            self,
            term_index,
            flags,
            learning_rate,
            min_samples_leaf,
            min_hessian,
            leaves_max,
            direction,
        )
    }
}
