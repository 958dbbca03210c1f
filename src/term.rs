//! Feature and term metadata for boosting.
//!
//! A *term* is one additive component of the model: a single feature or a
//! small Cartesian product of features. Its histogram is a dense tensor with
//! one cell per combination of feature bins; dimensions whose feature has a
//! single bin contribute nothing and are dropped from the *real* dimension
//! count. All derived quantities (tensor size, packing width, auxiliary
//! scratch size) are computed once at construction.

use log::Level;

use crate::error::BoostError;
use crate::logging::LogCounter;

/// How many entry/exit log lines a term emits at `Debug` before demoting.
const TERM_LOG_LIMIT: u32 = 10;

/// Boosting-side metadata for one binned feature.
#[derive(Debug, Clone)]
pub struct Feature {
    bins: usize,
}

impl Feature {
    /// A feature discretized into `bins` bins.
    pub fn new(bins: usize) -> Self {
        Self { bins }
    }

    /// Number of bins, including any missing/unseen bins the binning layer
    /// chose to reserve.
    #[inline]
    pub fn count_bins(&self) -> usize {
        self.bins
    }
}

/// One additive term: an ordered set of features plus derived layout data.
#[derive(Debug, Clone)]
pub struct Term {
    features: Vec<usize>,
    bin_counts: Vec<usize>,
    tensor_bins: usize,
    real_dimensions: usize,
    bits_required: u32,
    log_enter: LogCounter,
    log_exit: LogCounter,
}

impl Term {
    /// Build a term over `feature_indexes` into `features`.
    ///
    /// Fails if any index is out of range or the tensor size would overflow.
    pub fn new(features: &[Feature], feature_indexes: Vec<usize>) -> Result<Self, BoostError> {
        let mut bin_counts = Vec::with_capacity(feature_indexes.len());
        let mut tensor_bins = 1usize;
        let mut real_dimensions = 0;
        for &index in &feature_indexes {
            let feature = features
                .get(index)
                .ok_or(BoostError::IllegalParamVal("term feature index out of range"))?;
            let bins = feature.count_bins();
            tensor_bins = tensor_bins
                .checked_mul(bins)
                .ok_or(BoostError::IllegalParamVal("term tensor bin count overflow"))?;
            if bins > 1 {
                real_dimensions += 1;
            }
            bin_counts.push(bins);
        }

        // Minimum bits needed to store any tensor-bin index.
        let bits_required = match tensor_bins {
            0 | 1 => 1,
            n => usize::BITS - (n - 1).leading_zeros(),
        };

        Ok(Self {
            features: feature_indexes,
            bin_counts,
            tensor_bins,
            real_dimensions,
            bits_required,
            log_enter: LogCounter::new(TERM_LOG_LIMIT, Level::Debug),
            log_exit: LogCounter::new(TERM_LOG_LIMIT, Level::Debug),
        })
    }

    /// Feature indexes, one per dimension, in tensor order (dimension 0 has
    /// the smallest stride).
    #[inline]
    pub fn feature_indexes(&self) -> &[usize] {
        &self.features
    }

    /// Bin counts per dimension, aligned with [`feature_indexes`](Self::feature_indexes).
    #[inline]
    pub fn bin_counts(&self) -> &[usize] {
        &self.bin_counts
    }

    /// Total number of dimensions, including insignificant ones.
    #[inline]
    pub fn count_dimensions(&self) -> usize {
        self.features.len()
    }

    /// Number of dimensions with at least two bins.
    #[inline]
    pub fn count_real_dimensions(&self) -> usize {
        self.real_dimensions
    }

    /// Total histogram cells: the product of per-dimension bin counts.
    #[inline]
    pub fn count_tensor_bins(&self) -> usize {
        self.tensor_bins
    }

    /// Bits needed to store a tensor-bin index in a packed column.
    #[inline]
    pub fn bits_required(&self) -> u32 {
        self.bits_required
    }

    /// Scratch bins appended after the histogram tensor.
    ///
    /// The two-dimensional partitioner needs a snapshot of the pre-totals
    /// histogram while the tensor itself is overwritten with prefix sums, so
    /// terms with two or more real dimensions reserve a full extra tensor.
    #[inline]
    pub fn count_auxiliary_bins(&self) -> usize {
        if self.real_dimensions >= 2 {
            self.tensor_bins
        } else {
            0
        }
    }

    /// Linearize per-dimension bin indexes into a tensor-bin index.
    /// Dimension 0 varies fastest.
    pub fn tensor_index(&self, bin_indexes: &[usize]) -> usize {
        debug_assert_eq!(bin_indexes.len(), self.bin_counts.len());
        let mut index = 0;
        let mut stride = 1;
        for (&bin, &bins) in bin_indexes.iter().zip(&self.bin_counts) {
            debug_assert!(bin < bins);
            index += bin * stride;
            stride *= bins;
        }
        index
    }

    pub(crate) fn log_enter(&self) -> &LogCounter {
        &self.log_enter
    }

    pub(crate) fn log_exit(&self) -> &LogCounter {
        &self.log_exit
    }
}
