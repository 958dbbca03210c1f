//! Histogram bin storage in two precisions.
//!
//! The scatter stage writes *fast bins*: gradient-only accumulators in the
//! subset's native float width, with no counts or weights. The partitioners
//! read *main bins*: wide `f64` accumulators with sample counts and weight
//! sums. The converter bridges the two once per subset, so narrow floats
//! never survive past a single scatter pass.
//!
//! Both layouts are structure-of-arrays: per-bin scalars in flat vectors and
//! per-(bin, score) values bin-major, which keeps the scatter inner loop and
//! the prefix-sum stripes contiguous.

mod convert;
mod sums;
mod totals;

pub use convert::convert_add_bins;
pub use sums::{bin_sums_boosting, parallel_bin_planes, reduce_planes};
pub use totals::tensor_totals;

use wide::{f32x8, f64x4};

use crate::data::FloatVec;

// ============================================================================
// BinFloat
// ============================================================================

/// Storage float for fast bins, dispatched from the subset capability record.
pub trait BinFloat:
    Copy + Default + PartialEq + std::ops::AddAssign + std::ops::Mul<Output = Self> + 'static
{
    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;

    /// Borrow this width's (gradient, hessian) scratch buffers.
    fn scratch(scratch: &mut FastBinScratch) -> (&mut Vec<Self>, &mut Vec<Self>);

    /// View subset storage as this width. Panics on a width mismatch, which
    /// would mean a capability record lied about its subset.
    fn float_slice(storage: &FloatVec) -> &[Self];

    /// `dst[i] += src[i]` over equal-length slices, vectorized.
    fn add_slices(dst: &mut [Self], src: &[Self]);
}

impl BinFloat for f32 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn scratch(scratch: &mut FastBinScratch) -> (&mut Vec<Self>, &mut Vec<Self>) {
        (&mut scratch.grads32, &mut scratch.hess32)
    }

    fn float_slice(storage: &FloatVec) -> &[Self] {
        match storage {
            FloatVec::F32(values) => values,
            FloatVec::F64(_) => unreachable!("f32 subset holds f64 storage"),
        }
    }

    fn add_slices(dst: &mut [Self], src: &[Self]) {
        debug_assert_eq!(dst.len(), src.len());
        let mut dst_chunks = dst.chunks_exact_mut(8);
        let mut src_chunks = src.chunks_exact(8);
        for (d, s) in (&mut dst_chunks).zip(&mut src_chunks) {
            let sum = f32x8::from(<[f32; 8]>::try_from(&*d).unwrap())
                + f32x8::from(<[f32; 8]>::try_from(s).unwrap());
            d.copy_from_slice(&sum.to_array());
        }
        for (d, s) in dst_chunks.into_remainder().iter_mut().zip(src_chunks.remainder()) {
            *d += *s;
        }
    }
}

impl BinFloat for f64 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    fn scratch(scratch: &mut FastBinScratch) -> (&mut Vec<Self>, &mut Vec<Self>) {
        (&mut scratch.grads64, &mut scratch.hess64)
    }

    fn float_slice(storage: &FloatVec) -> &[Self] {
        match storage {
            FloatVec::F64(values) => values,
            FloatVec::F32(_) => unreachable!("f64 subset holds f32 storage"),
        }
    }

    fn add_slices(dst: &mut [Self], src: &[Self]) {
        debug_assert_eq!(dst.len(), src.len());
        let mut dst_chunks = dst.chunks_exact_mut(4);
        let mut src_chunks = src.chunks_exact(4);
        for (d, s) in (&mut dst_chunks).zip(&mut src_chunks) {
            let sum = f64x4::from(<[f64; 4]>::try_from(&*d).unwrap())
                + f64x4::from(<[f64; 4]>::try_from(s).unwrap());
            d.copy_from_slice(&sum.to_array());
        }
        for (d, s) in dst_chunks.into_remainder().iter_mut().zip(src_chunks.remainder()) {
            *d += *s;
        }
    }
}

// ============================================================================
// FastBinScratch
// ============================================================================

/// Reusable scatter scratch, one buffer per storage width.
///
/// The shell owns one of these across calls; each scatter phase resizes and
/// zeroes only the width it needs, so the allocation amortizes over the
/// boosting run.
#[derive(Debug, Default)]
pub struct FastBinScratch {
    grads32: Vec<f32>,
    hess32: Vec<f32>,
    grads64: Vec<f64>,
    hess64: Vec<f64>,
}

impl FastBinScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroed (gradient, hessian) planes of `len` values each.
    ///
    /// `len` already includes the SIMD plane factor. The hessian buffer is
    /// left empty for gradient-only objectives.
    pub fn prepare<F: BinFloat>(&mut self, len: usize, has_hessian: bool) -> (&mut [F], &mut [F]) {
        let (grads, hess) = F::scratch(self);
        grads.clear();
        grads.resize(len, F::default());
        hess.clear();
        hess.resize(if has_hessian { len } else { 0 }, F::default());
        (grads.as_mut_slice(), hess.as_mut_slice())
    }
}

// ============================================================================
// MainBins
// ============================================================================

/// Wide-precision histogram bins, the canonical form read by partitioners.
///
/// The buffer is sized for the largest term's tensor plus its auxiliary
/// suffix and reused across calls; each call zeroes the prefix it uses.
#[derive(Debug)]
pub struct MainBins {
    n_scores: usize,
    has_hessian: bool,
    counts: Vec<u64>,
    weights: Vec<f64>,
    /// Bin-major: `grads[bin * n_scores + score]`.
    grads: Vec<f64>,
    hess: Vec<f64>,
}

impl MainBins {
    pub fn new(n_scores: usize, has_hessian: bool) -> Self {
        Self {
            n_scores,
            has_hessian,
            counts: Vec::new(),
            weights: Vec::new(),
            grads: Vec::new(),
            hess: Vec::new(),
        }
    }

    /// Score dimensions per bin.
    #[inline]
    pub fn n_scores(&self) -> usize {
        self.n_scores
    }

    /// Whether hessian sums are maintained.
    #[inline]
    pub fn has_hessian(&self) -> bool {
        self.has_hessian
    }

    /// Grow storage to hold at least `n_bins` bins.
    pub fn ensure_bins(&mut self, n_bins: usize) {
        if self.counts.len() < n_bins {
            self.counts.resize(n_bins, 0);
            self.weights.resize(n_bins, 0.0);
            self.grads.resize(n_bins * self.n_scores, 0.0);
            if self.has_hessian {
                self.hess.resize(n_bins * self.n_scores, 0.0);
            }
        }
    }

    /// Zero the first `n_bins` bins.
    pub fn zero_bins(&mut self, n_bins: usize) {
        self.counts[..n_bins].fill(0);
        self.weights[..n_bins].fill(0.0);
        self.grads[..n_bins * self.n_scores].fill(0.0);
        if self.has_hessian {
            self.hess[..n_bins * self.n_scores].fill(0.0);
        }
    }

    #[inline]
    pub fn count(&self, bin: usize) -> u64 {
        self.counts[bin]
    }

    #[inline]
    pub fn weight(&self, bin: usize) -> f64 {
        self.weights[bin]
    }

    #[inline]
    pub fn grad(&self, bin: usize, score: usize) -> f64 {
        self.grads[bin * self.n_scores + score]
    }

    /// Hessian sum for `(bin, score)`; zero for gradient-only objectives.
    #[inline]
    pub fn hess(&self, bin: usize, score: usize) -> f64 {
        if self.has_hessian {
            self.hess[bin * self.n_scores + score]
        } else {
            0.0
        }
    }

    #[inline]
    pub fn add_count(&mut self, bin: usize, v: u64) {
        self.counts[bin] += v;
    }

    #[inline]
    pub fn add_weight(&mut self, bin: usize, v: f64) {
        self.weights[bin] += v;
    }

    #[inline]
    pub fn add_grad(&mut self, bin: usize, score: usize, v: f64) {
        self.grads[bin * self.n_scores + score] += v;
    }

    #[inline]
    pub fn add_hess(&mut self, bin: usize, score: usize, v: f64) {
        debug_assert!(self.has_hessian);
        self.hess[bin * self.n_scores + score] += v;
    }

    /// `bins[dst] += bins[src]`, the prefix-sum accumulation step.
    pub fn accumulate_bin(&mut self, dst: usize, src: usize) {
        debug_assert_ne!(dst, src);
        self.counts[dst] += self.counts[src];
        self.weights[dst] += self.weights[src];
        for score in 0..self.n_scores {
            let v = self.grads[src * self.n_scores + score];
            self.grads[dst * self.n_scores + score] += v;
            if self.has_hessian {
                let h = self.hess[src * self.n_scores + score];
                self.hess[dst * self.n_scores + score] += h;
            }
        }
    }

    /// Copy bins `[0, n_bins)` to `[dst_start, dst_start + n_bins)`.
    pub fn snapshot(&mut self, n_bins: usize, dst_start: usize) {
        debug_assert!(dst_start >= n_bins);
        self.counts.copy_within(0..n_bins, dst_start);
        self.weights.copy_within(0..n_bins, dst_start);
        let values = n_bins * self.n_scores;
        let dst_values = dst_start * self.n_scores;
        self.grads.copy_within(0..values, dst_values);
        if self.has_hessian {
            self.hess.copy_within(0..values, dst_values);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_bins_accumulate() {
        let mut bins = MainBins::new(2, true);
        bins.ensure_bins(3);
        bins.add_count(0, 2);
        bins.add_weight(0, 1.5);
        bins.add_grad(0, 1, 4.0);
        bins.add_hess(0, 1, 0.5);
        bins.add_count(1, 1);
        bins.add_grad(1, 1, -1.0);

        bins.accumulate_bin(1, 0);
        assert_eq!(bins.count(1), 3);
        assert_eq!(bins.weight(1), 1.5);
        assert_eq!(bins.grad(1, 1), 3.0);
        assert_eq!(bins.hess(1, 1), 0.5);
    }

    #[test]
    fn test_main_bins_snapshot() {
        let mut bins = MainBins::new(1, false);
        bins.ensure_bins(4);
        bins.add_grad(0, 0, 1.0);
        bins.add_grad(1, 0, 2.0);
        bins.snapshot(2, 2);
        assert_eq!(bins.grad(2, 0), 1.0);
        assert_eq!(bins.grad(3, 0), 2.0);
        // Hessian reads are zero without a hessian objective.
        assert_eq!(bins.hess(0, 0), 0.0);
    }

    #[test]
    fn test_zero_bins_only_touches_prefix() {
        let mut bins = MainBins::new(1, true);
        bins.ensure_bins(3);
        for bin in 0..3 {
            bins.add_count(bin, 1);
            bins.add_grad(bin, 0, 1.0);
        }
        bins.zero_bins(2);
        assert_eq!(bins.count(0), 0);
        assert_eq!(bins.count(1), 0);
        assert_eq!(bins.count(2), 1);
        assert_eq!(bins.grad(2, 0), 1.0);
    }

    #[test]
    fn test_add_slices_matches_scalar() {
        let mut dst: Vec<f32> = (0..19).map(|i| i as f32).collect();
        let src: Vec<f32> = (0..19).map(|i| (i * 2) as f32).collect();
        let expected: Vec<f32> = dst.iter().zip(&src).map(|(a, b)| a + b).collect();
        <f32 as BinFloat>::add_slices(&mut dst, &src);
        assert_eq!(dst, expected);

        let mut dst64: Vec<f64> = (0..11).map(|i| i as f64 * 0.5).collect();
        let src64: Vec<f64> = (0..11).map(|i| i as f64).collect();
        let expected64: Vec<f64> = dst64.iter().zip(&src64).map(|(a, b)| a + b).collect();
        <f64 as BinFloat>::add_slices(&mut dst64, &src64);
        assert_eq!(dst64, expected64);
    }

    #[test]
    fn test_scratch_prepare_zeroes() {
        let mut scratch = FastBinScratch::new();
        {
            let (grads, hess) = scratch.prepare::<f32>(8, true);
            grads[3] = 5.0;
            hess[2] = 1.0;
        }
        let (grads, hess) = scratch.prepare::<f32>(8, true);
        assert!(grads.iter().all(|&g| g == 0.0));
        assert!(hess.iter().all(|&h| h == 0.0));

        let (_, hess) = scratch.prepare::<f64>(4, false);
        assert!(hess.is_empty());
    }
}
