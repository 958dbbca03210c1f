//! Piecewise-constant update tensors over heterogeneous cut sets.
//!
//! A term update is a function over the term's input space that is constant
//! within each cell of a sparse grid: per dimension, a strictly-increasing
//! list of *cut points* (bin-index boundaries in `[1, cBins-1]`) splits the
//! axis into `cuts + 1` segments, and a flat row-major value array holds
//! `n_scores` values per cell. Two tensors produced from different
//! partitions of the same term can be summed by projecting both onto the
//! union grid.
//!
//! The in-place `add` and `expand` rewrites grow the value array and then
//! fill it back-to-front: the write cursor only ever touches indexes at or
//! above both read cursors, so the old cells stay readable until the moment
//! they are consumed. Capacity grows by 1.5x so repeated adds across a
//! boosting run settle quickly.

use wide::f64x4;

use crate::error::BoostError;

/// A sparse piecewise-constant tensor holding one term update.
#[derive(Debug, Clone)]
pub struct UpdateTensor {
    n_scores: usize,
    dims: usize,
    /// Cut lists per dimension; only the first `dims` entries are live, the
    /// rest keep their capacity for reuse.
    cuts: Vec<Vec<usize>>,
    values: Vec<f64>,
    expanded: bool,
}

impl UpdateTensor {
    /// A zero-dimensional tensor with one all-zero cell of `n_scores` values.
    pub fn new(n_scores: usize) -> Self {
        debug_assert!(n_scores >= 1);
        Self { n_scores, dims: 0, cuts: Vec::new(), values: vec![0.0; n_scores], expanded: false }
    }

    /// Change the dimension count. The tensor must be [`reset`](Self::reset)
    /// afterwards before anything reads it.
    pub fn set_dimension_count(&mut self, dims: usize) {
        if self.cuts.len() < dims {
            self.cuts.resize_with(dims, Vec::new);
        }
        self.dims = dims;
    }

    /// Clear every cut list and shrink the value array back to a single
    /// all-zero cell.
    pub fn reset(&mut self) {
        for cuts in &mut self.cuts[..self.dims] {
            cuts.clear();
        }
        self.values.truncate(self.n_scores);
        self.values.fill(0.0);
        self.expanded = false;
    }

    /// Score dimensions per cell.
    #[inline]
    pub fn n_scores(&self) -> usize {
        self.n_scores
    }

    /// Number of tensor dimensions.
    #[inline]
    pub fn n_dimensions(&self) -> usize {
        self.dims
    }

    /// Whether the cuts are the materialized identity grid.
    #[inline]
    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Cut points of `dim`.
    #[inline]
    pub fn cuts(&self, dim: usize) -> &[usize] {
        &self.cuts[dim]
    }

    /// Segments along `dim`.
    #[inline]
    pub fn n_segments(&self, dim: usize) -> usize {
        self.cuts[dim].len() + 1
    }

    /// Total cells across all dimensions.
    pub fn n_cells(&self) -> usize {
        (0..self.dims).map(|d| self.n_segments(d)).product()
    }

    /// Expected length of the value array for the current cuts.
    pub fn value_len(&self) -> usize {
        self.n_cells() * self.n_scores
    }

    /// The value array, `n_scores` values per cell in row-major mixed-radix
    /// order (dimension 0 fastest).
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mutable value array.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Linear index of the first value of the cell addressed by per-dimension
    /// segment indexes.
    pub fn value_index(&self, segment_indexes: &[usize]) -> usize {
        debug_assert_eq!(segment_indexes.len(), self.dims);
        let mut index = 0;
        let mut stride = 1;
        for (d, &segment) in segment_indexes.iter().enumerate() {
            debug_assert!(segment < self.n_segments(d));
            index += segment * stride;
            stride *= self.n_segments(d);
        }
        index * self.n_scores
    }

    /// Install new cut points on `dim`.
    ///
    /// Input must be strictly increasing within `[1, cBins-1]`. The value
    /// array is stale afterwards; the caller re-establishes it with
    /// [`reset_values`](Self::reset_values) before the next read.
    pub fn set_cuts(&mut self, dim: usize, new_cuts: &[usize]) -> Result<(), BoostError> {
        debug_assert!(dim < self.dims);
        debug_assert!(new_cuts.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(new_cuts.first().map_or(true, |&c| c >= 1));
        // An expanded tensor is already at its finest grid.
        debug_assert!(!self.expanded || new_cuts.len() <= self.cuts[dim].len());
        store_cuts(&mut self.cuts[dim], new_cuts)
    }

    /// Resize the value array to match the current cuts, zero it, and return
    /// it for filling.
    pub fn reset_values(&mut self) -> Result<&mut [f64], BoostError> {
        let len = self.value_len();
        self.ensure_value_capacity(len)?;
        self.values.clear();
        self.values.resize(len, 0.0);
        Ok(&mut self.values)
    }

    /// Materialize the identity grid: every dimension gets one segment per
    /// bin and each coarse cell's value is broadcast into the fine cells it
    /// covers. Idempotent once expanded.
    pub fn expand(&mut self, bins_per_dim: &[usize]) -> Result<(), BoostError> {
        debug_assert_eq!(bins_per_dim.len(), self.dims);
        if self.expanded {
            return Ok(());
        }
        if self.dims == 0 {
            self.expanded = true;
            return Ok(());
        }

        let dims = self.dims;
        let n_scores = self.n_scores;

        // Per dimension: fine bin -> coarse segment, plus old strides.
        let mut maps: Vec<Vec<usize>> = Vec::with_capacity(dims);
        let mut old_strides = Vec::with_capacity(dims);
        let mut old_stride = 1;
        for (d, &bins) in bins_per_dim.iter().enumerate() {
            debug_assert!(bins >= 1);
            debug_assert!(self.cuts[d].last().map_or(true, |&c| c < bins));
            let cuts = &self.cuts[d];
            maps.push((0..bins).map(|bin| segment_of(cuts, bin)).collect());
            old_strides.push(old_stride);
            old_stride *= cuts.len() + 1;
        }

        let n_new_cells: usize = bins_per_dim.iter().product();
        let new_len = n_new_cells * n_scores;
        self.ensure_value_capacity(new_len)?;
        self.values.resize(new_len, 0.0);

        // Back-to-front broadcast; the source cell index never exceeds the
        // destination, so unconsumed old values are never overwritten.
        for cell in (0..n_new_cells).rev() {
            let mut rem = cell;
            let mut old_cell = 0;
            for d in 0..dims {
                let bin = rem % bins_per_dim[d];
                rem /= bins_per_dim[d];
                old_cell += maps[d][bin] * old_strides[d];
            }
            debug_assert!(old_cell <= cell);
            for score in (0..n_scores).rev() {
                self.values[cell * n_scores + score] = self.values[old_cell * n_scores + score];
            }
        }

        for (d, &bins) in bins_per_dim.iter().enumerate() {
            let identity: Vec<usize> = (1..bins).collect();
            store_cuts(&mut self.cuts[d], &identity)?;
        }
        self.expanded = true;
        Ok(())
    }

    /// Add another tensor over the same dimensions.
    ///
    /// The result's cuts are the per-dimension sorted union; values are the
    /// cell-wise sum after projecting both operands onto the union grid.
    pub fn add(&mut self, other: &UpdateTensor) -> Result<(), BoostError> {
        debug_assert_eq!(self.dims, other.dims);
        debug_assert_eq!(self.n_scores, other.n_scores);

        let dims = self.dims;
        let n_scores = self.n_scores;
        if dims == 0 {
            for score in 0..n_scores {
                self.values[score] += other.values[score];
            }
            return Ok(());
        }

        // Union cuts and the projection of every union segment into each
        // operand's segment space.
        let mut merged_cuts: Vec<Vec<usize>> = Vec::with_capacity(dims);
        let mut map_self: Vec<Vec<usize>> = Vec::with_capacity(dims);
        let mut map_other: Vec<Vec<usize>> = Vec::with_capacity(dims);
        let mut new_segments = Vec::with_capacity(dims);
        let mut self_strides = Vec::with_capacity(dims);
        let mut other_strides = Vec::with_capacity(dims);
        let mut self_stride = 1;
        let mut other_stride = 1;
        for d in 0..dims {
            let merged = merge_cuts(&self.cuts[d], &other.cuts[d]);
            let segments = merged.len() + 1;
            let mut to_self = Vec::with_capacity(segments);
            let mut to_other = Vec::with_capacity(segments);
            for t in 0..segments {
                let start_bin = if t == 0 { 0 } else { merged[t - 1] };
                to_self.push(segment_of(&self.cuts[d], start_bin));
                to_other.push(segment_of(&other.cuts[d], start_bin));
            }
            new_segments.push(segments);
            map_self.push(to_self);
            map_other.push(to_other);
            merged_cuts.push(merged);
            self_strides.push(self_stride);
            other_strides.push(other_stride);
            self_stride *= self.cuts[d].len() + 1;
            other_stride *= other.cuts[d].len() + 1;
        }

        let n_new_cells: usize = new_segments.iter().product();
        let new_len = n_new_cells * n_scores;
        self.ensure_value_capacity(new_len)?;
        self.values.resize(new_len, 0.0);

        for cell in (0..n_new_cells).rev() {
            let mut rem = cell;
            let mut self_cell = 0;
            let mut other_cell = 0;
            for d in 0..dims {
                let t = rem % new_segments[d];
                rem /= new_segments[d];
                self_cell += map_self[d][t] * self_strides[d];
                other_cell += map_other[d][t] * other_strides[d];
            }
            debug_assert!(self_cell <= cell);
            for score in (0..n_scores).rev() {
                let sum = self.values[self_cell * n_scores + score]
                    + other.values[other_cell * n_scores + score];
                self.values[cell * n_scores + score] = sum;
            }
        }

        for (d, merged) in merged_cuts.iter().enumerate() {
            store_cuts(&mut self.cuts[d], merged)?;
        }
        Ok(())
    }

    /// Elementwise add a dense value array onto an expanded tensor.
    pub fn add_expanded(&mut self, other_values: &[f64]) {
        debug_assert!(self.expanded || self.dims == 0);
        debug_assert_eq!(other_values.len(), self.values.len());
        for (dst, &src) in self.values.iter_mut().zip(other_values) {
            *dst += src;
        }
    }

    /// Multiply every value by `v`.
    pub fn multiply(&mut self, v: f64) {
        for value in &mut self.values {
            *value *= v;
        }
    }

    /// Multiply every value by `v`; returns true if any result is NaN or
    /// infinite.
    pub fn multiply_and_check(&mut self, v: f64) -> bool {
        let factor = f64x4::splat(v);
        let mut bad = false;
        let mut chunks = self.values.chunks_exact_mut(4);
        for chunk in &mut chunks {
            let scaled = (f64x4::from(<[f64; 4]>::try_from(&*chunk).unwrap()) * factor).to_array();
            bad |= scaled.iter().any(|s| !s.is_finite());
            chunk.copy_from_slice(&scaled);
        }
        for value in chunks.into_remainder() {
            *value *= v;
            bad |= !value.is_finite();
        }
        bad
    }

    fn ensure_value_capacity(&mut self, needed: usize) -> Result<(), BoostError> {
        if self.values.capacity() < needed {
            let target = needed + (needed >> 1);
            self.values
                .try_reserve_exact(target - self.values.len())
                .map_err(|_| BoostError::OutOfMemory)?;
        }
        Ok(())
    }
}

/// Segment containing `bin`: the number of cuts at or below it.
#[inline]
fn segment_of(cuts: &[usize], bin: usize) -> usize {
    cuts.partition_point(|&c| c <= bin)
}

/// Sorted union of two strictly-increasing cut lists.
fn merge_cuts(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let (x, y) = (a[i], b[j]);
        merged.push(x.min(y));
        if x <= y {
            i += 1;
        }
        if y <= x {
            j += 1;
        }
    }
    merged.extend_from_slice(&a[i..]);
    merged.extend_from_slice(&b[j..]);
    merged
}

fn store_cuts(cut_vec: &mut Vec<usize>, new_cuts: &[usize]) -> Result<(), BoostError> {
    if cut_vec.capacity() < new_cuts.len() {
        let target = new_cuts.len() + (new_cuts.len() >> 1);
        cut_vec
            .try_reserve_exact(target - cut_vec.len())
            .map_err(|_| BoostError::OutOfMemory)?;
    }
    cut_vec.clear();
    cut_vec.extend_from_slice(new_cuts);
    Ok(())
}
