//! Term-update generation: the orchestrator and its partitioners.
//!
//! One call to [`generate_term_update`] produces, for a single term, a
//! tensor-shaped score update that decreases the loss when added to the
//! model, plus an aggregate gain. Per inner bag it histograms the gradients
//! over the term's tensor, partitions the histogram (greedy 1-D, joint 2-D
//! over prefix-sum totals, or data-independent random), computes per-leaf
//! updates, and accumulates the per-bag results into the shell's outer
//! update tensor, which is finally scaled by the learning rate.
//!
//! Numeric overflow is never an error here: a non-finite gain reports as
//! [`ILLEGAL_GAIN`], and a non-finite update value resets the whole update
//! tensor in addition.

mod one_dimensional;
mod random;
mod stats;
mod two_dimensional;

pub use one_dimensional::partition_one_dimensional_boosting;
pub use random::partition_random_boosting;
pub use stats::{
    compute_gradient_sum_update, compute_single_partition_update, leaf_value, node_partial_gain,
    sanitize_gain, NodeStats, UpdateRules, ILLEGAL_GAIN,
};
pub use two_dimensional::{partition_two_dimensional_boosting, RealDimension};

use log::{error, log, warn};

use crate::data::{DataSubset, FloatWidth, PackedIndexes};
use crate::error::BoostError;
use crate::flags::{MonotoneDirection, TermBoostFlags};
use crate::histogram::{
    bin_sums_boosting, convert_add_bins, parallel_bin_planes, reduce_planes, tensor_totals,
    BinFloat, FastBinScratch, MainBins,
};
use crate::rng::SplitRng;
use crate::shell::BoosterShell;
use crate::tensor::UpdateTensor;
use crate::term::Term;

/// Generate the update tensor and gain for one term.
///
/// On success the shell's term index is committed and the update sits in
/// [`BoosterShell::term_update`]; on any error the term index stays cleared
/// so a corrupt update can never be applied. The returned gain is
/// [`ILLEGAL_GAIN`] when the math overflowed; that is not an error.
///
/// `leaves_max` and `direction`, when given, must cover every term
/// dimension. A missing `leaves_max` disables splitting entirely (with a
/// warning), as do per-dimension budgets of one leaf.
#[allow(clippy::too_many_arguments)]
pub fn generate_term_update(
    rng: Option<&mut SplitRng>,
    shell: &mut BoosterShell,
    term_index: usize,
    flags: TermBoostFlags,
    learning_rate: f64,
    min_samples_leaf: u64,
    mut min_hessian: f64,
    leaves_max: Option<&[usize]>,
    direction: Option<&[MonotoneDirection]>,
) -> Result<f64, BoostError> {
    let BoosterShell {
        core,
        term_index: shell_term,
        fast_bins,
        main_bins,
        term_update,
        inner_term_update,
        log_generate,
    } = shell;

    // Stays cleared on every error path.
    *shell_term = None;

    log!(
        log_generate.next_level(),
        "GenerateTermUpdate: term_index={}, flags={:?}, learning_rate={:e}, \
         min_samples_leaf={}, min_hessian={:e}",
        term_index,
        flags,
        learning_rate,
        min_samples_leaf,
        min_hessian,
    );

    if term_index >= core.count_terms() {
        error!("GenerateTermUpdate term_index above the number of terms");
        return Err(BoostError::IllegalParamVal("term_index out of range"));
    }
    let term = core.term(term_index);
    log!(term.log_enter().next_level(), "Entered GenerateTermUpdate");

    let known = flags & TermBoostFlags::all();
    if known != flags {
        error!("GenerateTermUpdate flags contains unknown bits; ignoring extras");
    }

    if learning_rate.is_nan() {
        warn!("GenerateTermUpdate learning_rate is NaN");
    } else if learning_rate == f64::INFINITY {
        warn!("GenerateTermUpdate learning_rate is +infinity");
    } else if learning_rate == 0.0 {
        warn!("GenerateTermUpdate learning_rate is zero");
    } else if learning_rate < 0.0 {
        warn!("GenerateTermUpdate learning_rate is negative");
    }

    if min_hessian.is_nan() || min_hessian <= 0.0 {
        warn!("GenerateTermUpdate min_hessian must be positive; adjusting to minimum float");
        min_hessian = f64::MIN_POSITIVE;
    }

    let n_scores = core.count_scores();
    if n_scores == 0 {
        // A single-class objective predicts perfectly with zero-length score
        // vectors; the update is empty and the gain is zero.
        warn!("GenerateTermUpdate called with zero score dimensions");
        *shell_term = Some(term_index);
        return Ok(0.0);
    }

    let full_tensor_bins = term.count_tensor_bins();
    if full_tensor_bins == 0 {
        warn!("GenerateTermUpdate called on a term with zero tensor bins");
        *shell_term = Some(term_index);
        return Ok(0.0);
    }

    let dims = term.count_dimensions();
    let real_dims = term.count_real_dimensions();
    if let Some(leaves_max) = leaves_max {
        if leaves_max.len() < dims {
            return Err(BoostError::IllegalParamVal("leaves_max shorter than term dimensions"));
        }
    }
    if let Some(direction) = direction {
        if direction.len() < dims {
            return Err(BoostError::IllegalParamVal("direction shorter than term dimensions"));
        }
    }

    // Scan the per-dimension knobs: remember the (last) significant
    // dimension, its bin count and direction, and whether any significant
    // dimension still has a split budget.
    let mut last_leaves_max = 0usize;
    let mut significant_bins = 0usize;
    let mut significant_direction = MonotoneDirection::None;
    let mut important_dim = 0usize;
    match leaves_max {
        None => warn!("GenerateTermUpdate leaves_max was not given, so there won't be any splits"),
        Some(leaves_max) => {
            for d in 0..dims {
                let bins_d = term.bin_counts()[d];
                if bins_d > 1 {
                    important_dim = d;
                    significant_bins = bins_d;
                    let dir_d = direction.map_or(MonotoneDirection::None, |dirs| dirs[d]);
                    if dir_d.is_constrained() {
                        significant_direction = dir_d;
                    }
                    if leaves_max[d] <= 1 {
                        warn!("GenerateTermUpdate leaves_max is 1 or less on a significant dimension");
                    } else {
                        last_leaves_max = leaves_max[d];
                    }
                }
            }
        }
    }

    term_update.set_dimension_count(dims);
    term_update.reset();

    let mut gain_avg = 0.0f64;
    if core.training().count_samples() != 0 {
        let config = core.config();
        let bags = core.training().bag_count();
        let common = config.gradient_constant / bags as f64;

        let mut multiple = common;
        let mut gain_multiple = common;
        if known.contains(TermBoostFlags::GRADIENT_SUMS) {
            multiple *= config.learning_rate_adjustment_differential_privacy;
        } else if known.contains(TermBoostFlags::DISABLE_NEWTON_UPDATE) {
            multiple *= config.learning_rate_adjustment_gradient_boosting;
        } else {
            multiple /= config.hessian_constant;
            multiple *= config.learning_rate_adjustment_hessian_boosting;
        }
        if known.contains(TermBoostFlags::DISABLE_NEWTON_GAIN) {
            gain_multiple *= config.gain_adjustment_gradient_boosting;
        } else {
            gain_multiple /= config.hessian_constant;
            gain_multiple *= config.gain_adjustment_hessian_boosting;
        }
        multiple *= learning_rate;
        gain_multiple *= config.gradient_constant;

        let mut local_rng;
        let rng = match rng {
            Some(rng) => rng,
            None => {
                local_rng = SplitRng::from_entropy()?;
                &mut local_rng
            }
        };

        inner_term_update.set_dimension_count(dims);
        inner_term_update.reset();

        // Single-leaf budgets, and monotone constraints anywhere except a
        // pure one-dimensional term, both collapse the call to one bin.
        let collapsed =
            last_leaves_max == 0 || (real_dims != 1 && significant_direction.is_constrained());
        let tensor_bins = if collapsed { 1 } else { full_tensor_bins };

        let rules = UpdateRules::from_flags(known, core.is_hessian());
        let use_random = known.contains(TermBoostFlags::RANDOM_SPLITS) || real_dims > 2;
        let aux_bins =
            if !use_random && real_dims == 2 { term.count_auxiliary_bins() } else { 0 };
        main_bins.ensure_bins(tensor_bins + aux_bins);

        for bag in 0..bags {
            main_bins.zero_bins(tensor_bins);

            let subsets = core.training().subsets();
            for (subset_index, subset) in subsets.iter().enumerate() {
                let last_subset = subset_index + 1 == subsets.len();
                // The precomputed count/weight tensors are merged exactly
                // once per bag, on the final subset's conversion.
                let term_bag = last_subset
                    .then(|| core.training().term_bag(collapsed, term_index, bag));
                let pack = (!collapsed).then(|| subset.term_indexes(term_index));
                histogram_subset(
                    subset,
                    pack,
                    bag,
                    tensor_bins,
                    n_scores,
                    core.is_hessian(),
                    fast_bins,
                    term_bag.map(|tensors| tensors.counts()),
                    term_bag.map(|tensors| tensors.weights()),
                    main_bins,
                );
            }

            inner_term_update.reset();

            if tensor_bins == 1 {
                warn!("GenerateTermUpdate boosting zero dimensional");
                boost_zero_dimensional(main_bins, &rules, inner_term_update)?;
            } else {
                let weight_total = core.training().bag_total(bag).weight;
                debug_assert!(weight_total > 0.0);

                let gain = if use_random {
                    let leaves_max = leaves_max
                        .ok_or(BoostError::UnexpectedInternal("random boosting without leaves_max"))?;
                    partition_random_boosting(
                        rng,
                        main_bins,
                        term,
                        &leaves_max[..dims],
                        &rules,
                        inner_term_update,
                    )?
                } else if real_dims == 1 {
                    partition_one_dimensional_boosting(
                        rng,
                        main_bins,
                        significant_bins,
                        important_dim,
                        &rules,
                        min_samples_leaf,
                        min_hessian,
                        last_leaves_max - 1,
                        significant_direction,
                        inner_term_update,
                    )?
                } else if real_dims == 2 {
                    tensor_totals(term.bin_counts(), main_bins, Some(tensor_bins));
                    let (x, y) = real_dimensions_of(term)?;
                    partition_two_dimensional_boosting(
                        main_bins,
                        x,
                        y,
                        &rules,
                        min_samples_leaf,
                        min_hessian,
                        tensor_bins,
                        inner_term_update,
                    )?
                } else {
                    return Err(BoostError::UnexpectedInternal(
                        "non-random boosting on more than two real dimensions",
                    ));
                };
                debug_assert!(gain >= 0.0);

                // Rescale per bag so a tiny bag weight promotes the gain to
                // +infinity before the averages are summed.
                gain_avg += gain / weight_total * gain_multiple;
            }

            term_update.add(inner_term_update)?;
        }

        // NaN < anything is false, so this also catches NaN.
        if !(gain_avg <= f64::MAX) {
            // Some inner bag overflowed. The update may still be useful, so
            // keep it and let the caller decide whether to stop boosting.
            gain_avg = ILLEGAL_GAIN;
        }

        // Symmetric-logit convention halves binary-classification updates.
        let factor = if n_scores == 2 { multiple * 0.5 } else { multiple };
        if term_update.multiply_and_check(factor) {
            // The update itself is poisoned; destroy it.
            term_update.set_dimension_count(dims);
            term_update.reset();
            gain_avg = ILLEGAL_GAIN;
        }
    }

    *shell_term = Some(term_index);
    log!(term.log_exit().next_level(), "Exited GenerateTermUpdate: gain_avg={:e}", gain_avg);
    Ok(gain_avg)
}

/// Scatter, reduce, and convert one subset's contribution to the main bins.
#[allow(clippy::too_many_arguments)]
fn histogram_subset(
    subset: &DataSubset,
    pack: Option<&PackedIndexes>,
    bag: usize,
    tensor_bins: usize,
    n_scores: usize,
    has_hessian: bool,
    scratch: &mut FastBinScratch,
    bag_counts: Option<&[u64]>,
    bag_weight_sums: Option<&[f64]>,
    main_bins: &mut MainBins,
) {
    match subset.caps().float_width {
        FloatWidth::F32 => histogram_subset_typed::<f32>(
            subset, pack, bag, tensor_bins, n_scores, has_hessian, scratch, bag_counts,
            bag_weight_sums, main_bins,
        ),
        FloatWidth::F64 => histogram_subset_typed::<f64>(
            subset, pack, bag, tensor_bins, n_scores, has_hessian, scratch, bag_counts,
            bag_weight_sums, main_bins,
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn histogram_subset_typed<F: BinFloat>(
    subset: &DataSubset,
    pack: Option<&PackedIndexes>,
    bag: usize,
    tensor_bins: usize,
    n_scores: usize,
    has_hessian: bool,
    scratch: &mut FastBinScratch,
    bag_counts: Option<&[u64]>,
    bag_weight_sums: Option<&[f64]>,
    main_bins: &mut MainBins,
) {
    let planes = if pack.is_none() {
        1
    } else {
        parallel_bin_planes(subset.caps(), n_scores, tensor_bins)
    };
    let plane_len = tensor_bins * n_scores;
    let (fast_grads, fast_hess) = scratch.prepare::<F>(planes * plane_len, has_hessian);

    let grads = F::float_slice(subset.grads());
    let hess = has_hessian.then(|| F::float_slice(subset.hess()));
    let weights = F::float_slice(subset.bag_weights(bag));

    bin_sums_boosting(
        grads,
        hess,
        weights,
        pack,
        n_scores,
        subset.count_samples(),
        tensor_bins,
        planes,
        fast_grads,
        fast_hess,
    );
    reduce_planes(fast_grads, plane_len, planes);
    if has_hessian {
        reduce_planes(fast_hess, plane_len, planes);
    }

    convert_add_bins(
        n_scores,
        has_hessian,
        tensor_bins,
        &fast_grads[..plane_len],
        if has_hessian { &fast_hess[..plane_len] } else { &[] },
        bag_counts,
        bag_weight_sums,
        main_bins,
    );
}

/// Sum everything into one update value per score.
fn boost_zero_dimensional(
    bins: &MainBins,
    rules: &UpdateRules,
    inner: &mut UpdateTensor,
) -> Result<(), BoostError> {
    let n_scores = bins.n_scores();
    let mut total = NodeStats::zeros(n_scores);
    total.add_bin(bins, 0);
    let values = inner.reset_values()?;
    for score in 0..n_scores {
        values[score] = leaf_value(rules, &total, score);
    }
    Ok(())
}

/// Locate the exactly-two significant dimensions of a pair term.
fn real_dimensions_of(term: &Term) -> Result<(RealDimension, RealDimension), BoostError> {
    let mut found: Vec<RealDimension> = Vec::with_capacity(2);
    let mut stride = 1;
    for (d, &bins) in term.bin_counts().iter().enumerate() {
        if bins > 1 {
            found.push(RealDimension { dim: d, bins, stride });
        }
        stride *= bins;
    }
    match found.as_slice() {
        &[x, y] => Ok((x, y)),
        _ => Err(BoostError::UnexpectedInternal("pair partitioner on a non-pair term")),
    }
}
