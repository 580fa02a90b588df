// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of Flatland — Licensed under AGPL-3.0-or-later.

//! End-to-end properties of the flatness estimator.

use fl_metrics::{
    metric_flatness, FactorTableData, FlatnessOptions, FlatnessScores, LinearRepresentation,
    MetricError,
};
use fl_tensor::{PureResult, Tensor, TensorError};

fn scale_column(column: usize, scale: f32) -> impl Fn(&Tensor) -> PureResult<Tensor> {
    move |batch: &Tensor| {
        Tensor::from_fn(batch.rows(), 1, |r, _| {
            batch
                .row(r)
                .map(|row| row[column] * scale)
                .unwrap_or_default()
        })
    }
}

fn options(factor_repeats: usize, batch_size: usize, seed: u64) -> FlatnessOptions {
    FlatnessOptions {
        factor_repeats,
        batch_size,
        seed: Some(seed),
        cycle_fail: false,
    }
}

#[test]
fn concrete_scenario_two_factors_one_degenerate() {
    // Factor 0 has size 1 and must be excluded everywhere; factor 1 maps
    // value v to the 1-D latent 2v, a perfectly even line.
    let data = FactorTableData::new(vec![1, 5]).unwrap();
    let encoder = scale_column(1, 2.0);
    let scores = metric_flatness(&data, &encoder, &options(16, 4, 3)).unwrap();

    assert!((scores.ave_flatness_l1 - 1.0).abs() < 1e-6);
    assert!((scores.ave_flatness_l2 - 1.0).abs() < 1e-6);
    assert!((scores.ave_flatness - 1.0).abs() < 1e-6);
    // Latents 0, 2, 4, 6, 8: width 8 and estimated length 4 * 2.
    assert!((scores.ave_width_l1 - 8.0).abs() < 1e-6);
    assert!((scores.ave_width_l2 - 8.0).abs() < 1e-6);
    assert!((scores.ave_length_l1 - 8.0).abs() < 1e-6);
    assert!((scores.ave_length_l2 - 8.0).abs() < 1e-6);
}

#[test]
fn norm_consistency_on_an_axis_aligned_line() {
    // Six traversal points spaced d = 0.5 along one axis of a 3-D latent
    // space: l1 and l2 widths coincide at (n - 1) * d and flatness is 1.
    let data = FactorTableData::new(vec![6]).unwrap();
    let encoder = |batch: &Tensor| {
        Tensor::from_fn(batch.rows(), 3, |r, c| {
            let row = batch.row(r).expect("row in range");
            if c == 0 {
                row[0] * 0.5
            } else {
                0.0
            }
        })
    };
    let scores = metric_flatness(&data, &encoder, &options(8, 4, 12)).unwrap();

    assert!((scores.ave_width_l1 - 2.5).abs() < 1e-6);
    assert!((scores.ave_width_l2 - 2.5).abs() < 1e-6);
    assert!((scores.ave_flatness - 1.0).abs() < 1e-6);
    assert!((scores.ave_flatness_l1 - 1.0).abs() < 1e-6);
    assert!((scores.ave_flatness_l2 - 1.0).abs() < 1e-6);
}

#[test]
fn fixed_seed_reproduces_identical_scores() {
    let data = FactorTableData::new(vec![3, 4]).unwrap();
    let encoder = LinearRepresentation::random(2, 3, 1.0, Some(5)).unwrap();
    let opts = options(8, 4, 11);

    let first = metric_flatness(&data, &encoder, &opts).unwrap();
    let second = metric_flatness(&data, &encoder, &opts).unwrap();
    assert_eq!(first, second);
}

#[test]
fn batch_size_never_changes_the_result() {
    let data = FactorTableData::new(vec![3, 4]).unwrap();
    let encoder = scale_column(0, 1.5);

    let reference = metric_flatness(&data, &encoder, &options(16, 64, 7)).unwrap();
    for batch_size in [1, 2, 3, 5] {
        let scores = metric_flatness(&data, &encoder, &options(16, batch_size, 7)).unwrap();
        assert_eq!(scores, reference, "batch_size={batch_size}");
    }
}

#[test]
fn size_one_factor_leaves_aggregates_unchanged() {
    let encoder = scale_column(0, 1.5);
    let plain = FactorTableData::new(vec![5]).unwrap();
    let padded = FactorTableData::new(vec![5, 1]).unwrap();

    let without = metric_flatness(&plain, &encoder, &options(8, 4, 9)).unwrap();
    let with = metric_flatness(&padded, &encoder, &options(8, 4, 9)).unwrap();
    assert_eq!(without, with);
}

#[test]
fn collapsed_representation_scores_zero_but_finite() {
    // Everything encodes to the origin: zero width and zero length must pair
    // up into zero flatness, never NaN.
    let data = FactorTableData::new(vec![4, 3]).unwrap();
    let encoder = |batch: &Tensor| Tensor::zeros(batch.rows(), 2);
    let scores = metric_flatness(&data, &encoder, &options(8, 4, 2)).unwrap();

    assert_eq!(scores, FlatnessScores::default());
    for (_, value) in scores.into_map() {
        assert!(value.is_finite());
    }
}

fn curved_estimate(factor_repeats: usize, seed: u64) -> f64 {
    // The curvature of the factor-0 traversal depends on the randomly drawn
    // base value of factor 1, so each repeat observes a different bend and
    // the estimate converges only as repeats grow.
    let data = FactorTableData::new(vec![5, 4]).unwrap();
    let encoder = |batch: &Tensor| {
        Tensor::from_fn(batch.rows(), 2, |r, c| {
            let row = batch.row(r).expect("row in range");
            if c == 0 {
                row[0]
            } else {
                0.3 * row[1] * row[0] * row[0]
            }
        })
    };
    let opts = FlatnessOptions {
        factor_repeats,
        batch_size: 8,
        seed: Some(seed),
        cycle_fail: false,
    };
    metric_flatness(&data, &encoder, &opts).unwrap().ave_flatness
}

fn sample_variance(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (values.len() - 1) as f64
}

#[test]
fn more_repeats_reduce_estimator_variance() {
    let coarse: Vec<f64> = (0..10).map(|s| curved_estimate(4, 1000 + s)).collect();
    let fine: Vec<f64> = (0..10).map(|s| curved_estimate(128, 2000 + s)).collect();
    assert!(
        sample_variance(&fine) < sample_variance(&coarse),
        "fine={fine:?} coarse={coarse:?}"
    );
}

#[test]
fn cycle_fail_names_the_offending_factor() {
    let data = FactorTableData::new(vec![1, 5]).unwrap();
    let encoder = scale_column(1, 2.0);
    let opts = FlatnessOptions {
        cycle_fail: true,
        ..options(8, 4, 0)
    };
    assert_eq!(
        metric_flatness(&data, &encoder, &opts).unwrap_err(),
        MetricError::DegenerateFactor { index: 0, size: 1 }
    );
}

#[test]
fn invalid_arguments_fail_before_any_computation() {
    let data = FactorTableData::new(vec![3]).unwrap();
    let encoder = scale_column(0, 1.0);

    let zero_repeats = FlatnessOptions {
        factor_repeats: 0,
        ..FlatnessOptions::default()
    };
    assert!(matches!(
        metric_flatness(&data, &encoder, &zero_repeats),
        Err(MetricError::InvalidArgument { .. })
    ));

    let zero_batch = FlatnessOptions {
        batch_size: 0,
        ..FlatnessOptions::default()
    };
    assert!(matches!(
        metric_flatness(&data, &encoder, &zero_batch),
        Err(MetricError::InvalidArgument { .. })
    ));
}

#[test]
fn all_degenerate_factors_are_rejected() {
    let data = FactorTableData::new(vec![1, 1]).unwrap();
    let encoder = scale_column(0, 1.0);
    assert_eq!(
        metric_flatness(&data, &encoder, &options(8, 4, 0)).unwrap_err(),
        MetricError::NoActiveFactors
    );
}

#[test]
fn representation_failures_propagate_unmodified() {
    let data = FactorTableData::new(vec![4]).unwrap();
    let failing = |_batch: &Tensor| -> PureResult<Tensor> {
        Err(TensorError::InvalidValue {
            label: "encoder_failure",
        })
    };
    assert_eq!(
        metric_flatness(&data, &failing, &options(8, 4, 0)).unwrap_err(),
        MetricError::Tensor(TensorError::InvalidValue {
            label: "encoder_failure",
        })
    );
}
