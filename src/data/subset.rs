//! Training subsets and their capability records.
//!
//! The objective layer hands the core pre-computed gradients and hessians in
//! whatever numeric precision it runs at. Rather than templating every
//! consumer on the storage widths, each subset carries an explicit
//! [`SubsetCaps`] record and the few hot loops dispatch once on it. Narrow
//! storage exists only between producer and converter; every accumulator in
//! the core is `f64`.

use crate::data::packed::PackedIndexes;

/// Integer word width of a subset's packed columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UintWidth {
    U32,
    U64,
}

/// Float width of a subset's gradient, hessian, and weight storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatWidth {
    F32,
    F64,
}

/// Capability record for one training subset.
///
/// This replaces compile-time layout templates: fast-bin sizing, packed-word
/// decoding, and SIMD plane counts all read from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsetCaps {
    /// Packed-column word width.
    pub uint_width: UintWidth,
    /// Gradient/hessian/weight storage width.
    pub float_width: FloatWidth,
    /// SIMD lanes the subset's objective kernels run at; also the number of
    /// independent fast-bin planes the scatter may keep.
    pub simd_width: usize,
    /// Whether the objective produces hessians.
    pub has_hessian: bool,
}

impl SubsetCaps {
    /// Wide storage, the default for f64 objectives.
    pub fn wide(has_hessian: bool) -> Self {
        Self { uint_width: UintWidth::U64, float_width: FloatWidth::F64, simd_width: 4, has_hessian }
    }

    /// Narrow storage, the default for f32 objectives.
    pub fn narrow(has_hessian: bool) -> Self {
        Self { uint_width: UintWidth::U32, float_width: FloatWidth::F32, simd_width: 8, has_hessian }
    }
}

/// Float storage in a subset's width.
#[derive(Debug, Clone)]
pub enum FloatVec {
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl FloatVec {
    /// Convert from canonical f64 values into `width` storage.
    pub fn from_f64(width: FloatWidth, values: &[f64]) -> Self {
        match width {
            FloatWidth::F32 => Self::F32(values.iter().map(|&v| v as f32).collect()),
            FloatWidth::F64 => Self::F64(values.to_vec()),
        }
    }

    /// Number of stored values.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    /// Whether the storage is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one value widened to f64.
    #[inline]
    pub fn get(&self, i: usize) -> f64 {
        match self {
            Self::F32(v) => v[i] as f64,
            Self::F64(v) => v[i],
        }
    }
}

/// One contiguous block of training samples sharing a capability record.
#[derive(Debug)]
pub struct DataSubset {
    caps: SubsetCaps,
    n_samples: usize,
    n_scores: usize,
    /// Score-major gradients: `grads[score * n_samples + sample]`.
    grads: FloatVec,
    /// Score-major hessians; empty when the objective has none.
    hess: FloatVec,
    /// Packed tensor-index column per term.
    term_indexes: Vec<PackedIndexes>,
    /// Per-inner-bag effective sample weights.
    bag_weights: Vec<FloatVec>,
}

impl DataSubset {
    pub(crate) fn new(
        caps: SubsetCaps,
        n_scores: usize,
        n_samples: usize,
        grads: &[f64],
        hess: Option<&[f64]>,
    ) -> Self {
        debug_assert_eq!(grads.len(), n_samples * n_scores);
        if let Some(hess) = hess {
            debug_assert!(caps.has_hessian);
            debug_assert_eq!(hess.len(), grads.len());
        }
        Self {
            caps,
            n_samples,
            n_scores,
            grads: FloatVec::from_f64(caps.float_width, grads),
            hess: FloatVec::from_f64(caps.float_width, hess.unwrap_or(&[])),
            term_indexes: Vec::new(),
            bag_weights: Vec::new(),
        }
    }

    pub(crate) fn push_term_indexes(&mut self, packed: PackedIndexes) {
        debug_assert_eq!(packed.len(), self.n_samples);
        self.term_indexes.push(packed);
    }

    pub(crate) fn push_bag_weights(&mut self, weights: &[f64]) {
        debug_assert_eq!(weights.len(), self.n_samples);
        self.bag_weights.push(FloatVec::from_f64(self.caps.float_width, weights));
    }

    /// Capability record this subset was built with.
    #[inline]
    pub fn caps(&self) -> &SubsetCaps {
        &self.caps
    }

    /// Sample count in this subset.
    #[inline]
    pub fn count_samples(&self) -> usize {
        self.n_samples
    }

    /// Score-major gradient storage.
    #[inline]
    pub fn grads(&self) -> &FloatVec {
        &self.grads
    }

    /// Score-major hessian storage, empty for gradient-only objectives.
    #[inline]
    pub fn hess(&self) -> &FloatVec {
        &self.hess
    }

    /// Packed tensor-index column for `term`.
    #[inline]
    pub fn term_indexes(&self, term: usize) -> &PackedIndexes {
        &self.term_indexes[term]
    }

    /// Effective sample weights for inner bag `bag`.
    #[inline]
    pub fn bag_weights(&self, bag: usize) -> &FloatVec {
        &self.bag_weights[bag]
    }
}
