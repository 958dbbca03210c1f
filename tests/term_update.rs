//! End-to-end term-update scenarios against a full booster shell.

use approx::assert_abs_diff_eq;
use cycleboost::data::{InnerBag, SubsetCaps};
use cycleboost::{
    BoosterConfig, BoosterCore, BoosterShell, BoostError, MonotoneDirection, SplitRng,
    TermBoostFlags, ILLEGAL_GAIN,
};

const NEWTON: TermBoostFlags = TermBoostFlags::empty();

/// One feature, one term, per-sample (bin, grad, hess) triples.
fn single_feature_shell(bins: usize, samples: &[(usize, f64, f64)]) -> BoosterShell {
    let mut builder = BoosterCore::builder(BoosterConfig::default());
    builder.add_feature(bins, samples.iter().map(|&(bin, _, _)| bin).collect());
    builder.add_term(&[0]);
    builder.gradients(samples.iter().map(|&(_, grad, _)| grad).collect());
    builder.hessians(samples.iter().map(|&(_, _, hess)| hess).collect());
    BoosterShell::new(builder.build().unwrap())
}

/// The S2 dataset: perfect separation over two bins.
fn separated_samples() -> Vec<(usize, f64, f64)> {
    let mut samples = Vec::new();
    for _ in 0..5 {
        samples.push((0, 4.0, 2.0));
    }
    for _ in 0..5 {
        samples.push((1, -4.0, 2.0));
    }
    samples
}

fn boost(
    shell: &mut BoosterShell,
    flags: TermBoostFlags,
    learning_rate: f64,
    min_samples_leaf: u64,
    leaves_max: &[usize],
    direction: Option<&[MonotoneDirection]>,
) -> f64 {
    let mut rng = SplitRng::seed_from_u64(1234);
    shell
        .generate_term_update(
            Some(&mut rng),
            0,
            flags,
            learning_rate,
            min_samples_leaf,
            1e-12,
            Some(leaves_max),
            direction,
        )
        .unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn scenario_zero_dimensional_boost() {
    // All features single-bin; 10 samples summing to grad 4.0, hessian 8.0.
    let samples: Vec<(usize, f64, f64)> = (0..10).map(|_| (0, 0.4, 0.8)).collect();
    let mut shell = single_feature_shell(1, &samples);
    let gain = boost(&mut shell, NEWTON, 1.0, 1, &[2], None);

    assert_eq!(gain, 0.0);
    assert_eq!(shell.term_index(), Some(0));
    let update = shell.term_update();
    assert!(update.cuts(0).is_empty());
    assert_eq!(update.values().len(), 1);
    assert_abs_diff_eq!(update.values()[0], -0.5, epsilon = 1e-12);
}

#[test]
fn scenario_one_dimensional_single_split() {
    let mut shell = single_feature_shell(2, &separated_samples());
    let gain = boost(&mut shell, NEWTON, 1.0, 1, &[2], None);

    let update = shell.term_update();
    assert_eq!(update.cuts(0), &[1]);
    assert_abs_diff_eq!(update.values()[0], -2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(update.values()[1], 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(gain, 8.0, epsilon = 1e-9);
}

#[test]
fn scenario_no_viable_split_collapses_to_zero_dimensional() {
    // Each child would need 6 of the 10 samples: nothing can split.
    let mut shell = single_feature_shell(2, &separated_samples());
    let gain = boost(&mut shell, NEWTON, 1.0, 6, &[2], None);

    assert_eq!(gain, 0.0);
    let update = shell.term_update();
    assert!(update.cuts(0).is_empty());
    // Balanced gradients cancel: the single leaf's update is zero.
    assert_abs_diff_eq!(update.values()[0], 0.0, epsilon = 1e-12);
}

#[test]
fn scenario_two_dimensional_pair() {
    // 2x2 tensor whose signal varies along dimension 0 only.
    let mut builder = BoosterCore::builder(BoosterConfig::default());
    builder.add_feature(2, vec![0, 0, 1, 1]);
    builder.add_feature(2, vec![0, 1, 0, 1]);
    builder.add_term(&[0, 1]);
    builder.gradients(vec![1.0, 1.0, -1.0, -1.0]);
    builder.hessians(vec![1.0; 4]);
    let mut shell = BoosterShell::new(builder.build().unwrap());

    let gain = boost(&mut shell, NEWTON, 1.0, 1, &[2, 2], None);
    let update = shell.term_update();
    assert_eq!(update.cuts(0), &[1]);
    assert!(update.cuts(1).is_empty());
    assert_abs_diff_eq!(update.values()[0], -1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(update.values()[1], 1.0, epsilon = 1e-12);
    assert!(gain > 0.0);
}

#[test]
fn scenario_monotone_rejection_falls_back() {
    // The optimal (only) split yields leaves -2 then +2; demanding the
    // opposite ordering rejects it and the update degrades to zero-D.
    let mut shell = single_feature_shell(2, &separated_samples());
    let gain = boost(
        &mut shell,
        NEWTON,
        1.0,
        1,
        &[2],
        Some(&[MonotoneDirection::Decreasing]),
    );
    assert_eq!(gain, 0.0);
    assert!(shell.term_update().cuts(0).is_empty());

    // The conforming direction keeps the split.
    let gain = boost(
        &mut shell,
        NEWTON,
        1.0,
        1,
        &[2],
        Some(&[MonotoneDirection::Increasing]),
    );
    assert!(gain > 0.0);
    assert_eq!(shell.term_update().cuts(0), &[1]);
}

#[test]
fn scenario_update_overflow_resets_and_reports_illegal_gain() {
    // Gradient sums overflow f64 during histogramming; the update tensor
    // scaling detects the non-finite cells.
    let samples: Vec<(usize, f64, f64)> = vec![(0, 1e308, 1.0), (0, 1e308, 1.0)];
    let mut shell = single_feature_shell(1, &samples);
    let gain = boost(&mut shell, NEWTON, 1.0, 1, &[2], None);

    assert_eq!(gain, ILLEGAL_GAIN);
    assert_eq!(shell.term_index(), Some(0));
    let update = shell.term_update();
    assert!(update.values().iter().all(|&v| v == 0.0));
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn learning_rate_scales_update_but_not_gain() {
    let mut shell = single_feature_shell(2, &separated_samples());

    let gain_zero = boost(&mut shell, NEWTON, 0.0, 1, &[2], None);
    assert!(shell.term_update().values().iter().all(|&v| v == 0.0));

    let gain_one = boost(&mut shell, NEWTON, 1.0, 1, &[2], None);
    let values_one = shell.term_update().values().to_vec();

    let gain_two = boost(&mut shell, NEWTON, 2.0, 1, &[2], None);
    let values_two = shell.term_update().values().to_vec();

    assert_abs_diff_eq!(gain_zero, gain_one, epsilon = 1e-9);
    assert_abs_diff_eq!(gain_one, gain_two, epsilon = 1e-9);
    for (one, two) in values_one.iter().zip(&values_two) {
        assert_abs_diff_eq!(*two, one * 2.0, epsilon = 1e-12);
    }
}

#[test]
fn identical_seeds_are_deterministic() {
    let samples: Vec<(usize, f64, f64)> = (0..64)
        .map(|i| ((i * 7 + 3) % 16, ((i * 13) % 9) as f64 - 4.0, 1.0 + (i % 3) as f64 * 0.5))
        .collect();

    for flags in [NEWTON, TermBoostFlags::RANDOM_SPLITS] {
        let run = || {
            let mut shell = single_feature_shell(16, &samples);
            let mut rng = SplitRng::seed_from_u64(777);
            let gain = shell
                .generate_term_update(
                    Some(&mut rng), 0, flags, 0.3, 1, 1e-9, Some(&[5]), None,
                )
                .unwrap();
            (gain, shell.term_update().cuts(0).to_vec(), shell.term_update().values().to_vec())
        };
        let (gain_a, cuts_a, values_a) = run();
        let (gain_b, cuts_b, values_b) = run();
        assert_eq!(gain_a.to_bits(), gain_b.to_bits());
        assert_eq!(cuts_a, cuts_b);
        let bits_a: Vec<u64> = values_a.iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u64> = values_b.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }
}

#[test]
fn gains_are_nonnegative_or_illegal() {
    for seed in 0..8u64 {
        let samples: Vec<(usize, f64, f64)> = (0..40)
            .map(|i| {
                let s = seed as usize + i;
                ((s * 11) % 8, ((s * 17) % 13) as f64 - 6.0, 0.25 + ((s * 5) % 4) as f64)
            })
            .collect();
        let mut shell = single_feature_shell(8, &samples);
        for flags in [
            NEWTON,
            TermBoostFlags::DISABLE_NEWTON_GAIN,
            TermBoostFlags::DISABLE_NEWTON_UPDATE,
            TermBoostFlags::RANDOM_SPLITS,
        ] {
            let mut rng = SplitRng::seed_from_u64(seed);
            let gain = shell
                .generate_term_update(
                    Some(&mut rng), 0, flags, 0.1, 2, 1e-9, Some(&[4]), None,
                )
                .unwrap();
            assert!(
                gain >= 0.0 || gain == ILLEGAL_GAIN,
                "flags {:?} seed {} produced gain {}",
                flags,
                seed,
                gain
            );
        }
    }
}

#[test]
fn two_identical_bags_average_to_the_single_bag_update() {
    let samples = separated_samples();
    let mut shell_one = single_feature_shell(2, &samples);
    let gain_one = boost(&mut shell_one, NEWTON, 1.0, 1, &[2], None);
    let values_one = shell_one.term_update().values().to_vec();

    let mut builder = BoosterCore::builder(BoosterConfig::default());
    builder.add_feature(2, samples.iter().map(|&(bin, _, _)| bin).collect());
    builder.add_term(&[0]);
    builder.gradients(samples.iter().map(|&(_, grad, _)| grad).collect());
    builder.hessians(samples.iter().map(|&(_, _, hess)| hess).collect());
    builder.add_inner_bag(InnerBag::full(samples.len()));
    builder.add_inner_bag(InnerBag::full(samples.len()));
    let mut shell_two = BoosterShell::new(builder.build().unwrap());
    let gain_two = boost(&mut shell_two, NEWTON, 1.0, 1, &[2], None);

    assert_abs_diff_eq!(gain_one, gain_two, epsilon = 1e-9);
    for (one, two) in values_one.iter().zip(shell_two.term_update().values()) {
        assert_abs_diff_eq!(*one, *two, epsilon = 1e-12);
    }
}

#[test]
fn gradient_sums_mode_emits_raw_sums() {
    let samples: Vec<(usize, f64, f64)> = (0..10).map(|_| (0, 0.4, 0.8)).collect();
    let mut shell = single_feature_shell(1, &samples);
    boost(&mut shell, TermBoostFlags::GRADIENT_SUMS, 1.0, 1, &[2], None);
    // No denominator: the single cell carries the gradient sum itself.
    assert_abs_diff_eq!(shell.term_update().values()[0], 4.0, epsilon = 1e-12);
}

#[test]
fn disabling_newton_update_divides_by_weight() {
    // Sum grad 4.0, hessian 8.0, weight 10.0 (unit sample weights).
    let samples: Vec<(usize, f64, f64)> = (0..10).map(|_| (0, 0.4, 0.8)).collect();
    let mut shell = single_feature_shell(1, &samples);
    boost(&mut shell, TermBoostFlags::DISABLE_NEWTON_UPDATE, 1.0, 1, &[2], None);
    assert_abs_diff_eq!(shell.term_update().values()[0], -0.4, epsilon = 1e-12);
}

#[test]
fn binary_classification_update_is_halved() {
    let config = BoosterConfig { n_scores: 2, ..BoosterConfig::default() };
    let mut builder = BoosterCore::builder(config);
    builder.add_feature(1, vec![0; 4]);
    builder.add_term(&[0]);
    // Score-major: score 0 then score 1, symmetric logits.
    builder.gradients(vec![1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0]);
    builder.hessians(vec![1.0; 8]);
    let mut shell = BoosterShell::new(builder.build().unwrap());

    boost(&mut shell, NEWTON, 1.0, 1, &[2], None);
    let values = shell.term_update().values();
    // Raw Newton value is -(4/4) = -1; halved by the symmetric-logit rule.
    assert_abs_diff_eq!(values[0], -0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(values[1], 0.5, epsilon = 1e-12);
}

#[test]
fn random_splits_stay_in_range_and_respect_budget() {
    let samples: Vec<(usize, f64, f64)> =
        (0..64).map(|i| (i % 16, (i % 5) as f64 - 2.0, 1.0)).collect();
    let mut shell = single_feature_shell(16, &samples);
    let gain = boost(&mut shell, TermBoostFlags::RANDOM_SPLITS, 1.0, 1, &[4], None);

    let update = shell.term_update();
    let cuts = update.cuts(0);
    assert_eq!(cuts.len(), 3);
    assert!(cuts.windows(2).all(|w| w[0] < w[1]));
    assert!(cuts.iter().all(|&c| (1..16).contains(&c)));
    assert!(gain >= 0.0);
}

#[test]
fn mixed_precision_subsets_agree_with_a_single_subset() {
    let samples: Vec<(usize, f64, f64)> =
        (0..32).map(|i| (i % 4, (i % 7) as f64 - 3.0, 1.0)).collect();

    let build = |layout: Option<Vec<(usize, SubsetCaps)>>| {
        let mut builder = BoosterCore::builder(BoosterConfig::default());
        builder.add_feature(4, samples.iter().map(|&(bin, _, _)| bin).collect());
        builder.add_term(&[0]);
        builder.gradients(samples.iter().map(|&(_, grad, _)| grad).collect());
        builder.hessians(samples.iter().map(|&(_, _, hess)| hess).collect());
        if let Some(layout) = layout {
            builder.subset_layout(layout);
        }
        BoosterShell::new(builder.build().unwrap())
    };

    let mut reference = build(None);
    let gain_ref = boost(&mut reference, NEWTON, 0.5, 1, &[4], None);

    let mut mixed = build(Some(vec![
        (16, SubsetCaps::narrow(true)),
        (16, SubsetCaps::wide(true)),
    ]));
    let gain_mixed = boost(&mut mixed, NEWTON, 0.5, 1, &[4], None);

    assert_abs_diff_eq!(gain_ref, gain_mixed, epsilon = 1e-4);
    assert_eq!(reference.term_update().cuts(0), mixed.term_update().cuts(0));
    for (a, b) in reference.term_update().values().iter().zip(mixed.term_update().values()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
    }
}

// ============================================================================
// Argument handling
// ============================================================================

#[test]
fn out_of_range_term_is_rejected_and_leaves_no_index() {
    let mut shell = single_feature_shell(2, &separated_samples());
    let mut rng = SplitRng::seed_from_u64(0);
    let err = shell
        .generate_term_update(Some(&mut rng), 5, NEWTON, 1.0, 1, 1e-9, Some(&[2]), None)
        .unwrap_err();
    assert!(matches!(err, BoostError::IllegalParamVal(_)));
    assert_eq!(shell.term_index(), None);
}

#[test]
fn missing_leaves_max_disables_splitting() {
    let mut shell = single_feature_shell(2, &separated_samples());
    let mut rng = SplitRng::seed_from_u64(0);
    let gain = shell
        .generate_term_update(Some(&mut rng), 0, NEWTON, 1.0, 1, 1e-9, None, None)
        .unwrap();
    assert_eq!(gain, 0.0);
    assert!(shell.term_update().cuts(0).is_empty());
}

#[test]
fn zero_scores_short_circuits() {
    let config = BoosterConfig { n_scores: 0, ..BoosterConfig::default() };
    let mut builder = BoosterCore::builder(config);
    builder.add_feature(2, vec![0, 1]);
    builder.add_term(&[0]);
    let mut shell = BoosterShell::new(builder.build().unwrap());
    let gain = shell
        .generate_term_update(None, 0, NEWTON, 1.0, 1, 1e-9, Some(&[2]), None)
        .unwrap();
    assert_eq!(gain, 0.0);
    assert_eq!(shell.term_index(), Some(0));
}

#[test]
fn empty_training_set_short_circuits() {
    let mut builder = BoosterCore::builder(BoosterConfig::default());
    builder.add_feature(3, Vec::new());
    builder.add_term(&[0]);
    builder.gradients(Vec::new());
    let mut shell = BoosterShell::new(builder.build().unwrap());
    let gain = shell
        .generate_term_update(None, 0, NEWTON, 1.0, 1, 1e-9, Some(&[2]), None)
        .unwrap();
    assert_eq!(gain, 0.0);
    assert_eq!(shell.term_index(), Some(0));
}

#[test]
fn weird_learning_rate_and_hessian_min_are_tolerated() {
    let mut shell = single_feature_shell(2, &separated_samples());
    let mut rng = SplitRng::seed_from_u64(3);
    // Negative min_hessian gets clamped, negative learning rate warns but
    // proceeds; the call still succeeds.
    let gain = shell
        .generate_term_update(
            Some(&mut rng), 0, NEWTON, -0.1, 1, -5.0, Some(&[2]), None,
        )
        .unwrap();
    assert!(gain >= 0.0 || gain == ILLEGAL_GAIN);
    assert_eq!(shell.term_index(), Some(0));
}

#[test]
fn unknown_flag_bits_are_ignored() {
    let mut shell = single_feature_shell(2, &separated_samples());
    let mut rng = SplitRng::seed_from_u64(3);
    let flags = TermBoostFlags::from_bits_retain(0xF000_0000);
    let gain = shell
        .generate_term_update(Some(&mut rng), 0, flags, 1.0, 1, 1e-9, Some(&[2]), None)
        .unwrap();
    assert_abs_diff_eq!(gain, 8.0, epsilon = 1e-9);
    assert_eq!(shell.term_update().cuts(0), &[1]);
}
