// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of Flatland — Licensed under AGPL-3.0-or-later.

//! The flatness estimator: traversal encoding, per-factor distance
//! aggregation and the cross-factor flatness scores.

use crate::dataset::{BatchMode, GroundTruthData};
use crate::distance::{cyclic_deltas, diameter};
use crate::represent::Representation;
use core::fmt;
use fl_tensor::{topk, Device, Norm, Tensor, TensorError};
use flat_config::determinism;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use tracing::{debug, warn};

/// Result alias for metric computations.
pub type MetricResult<T> = Result<T, MetricError>;

/// Errors emitted by the flatness estimator.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricError {
    /// A precondition on a caller-supplied argument failed.
    InvalidArgument { label: &'static str },
    /// The requested factor index does not exist.
    FactorOutOfRange { index: usize, num_factors: usize },
    /// A dataset reported a factor of size zero, which violates the
    /// ground-truth contract.
    InvalidFactorSize { index: usize, size: usize },
    /// A size-1 factor was encountered while cycle normalisation was required.
    DegenerateFactor { index: usize, size: usize },
    /// Every factor is degenerate; no aggregate can be formed.
    NoActiveFactors,
    /// A tensor-level failure, including anything raised inside the
    /// representation function, propagated unmodified.
    Tensor(TensorError),
}

impl fmt::Display for MetricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricError::InvalidArgument { label } => {
                write!(f, "invalid argument: {label}")
            }
            MetricError::FactorOutOfRange { index, num_factors } => {
                write!(
                    f,
                    "factor index {index} out of range for {num_factors} factors"
                )
            }
            MetricError::InvalidFactorSize { index, size } => {
                write!(
                    f,
                    "factor {index} reports size {size}; ground-truth factors must have size >= 1"
                )
            }
            MetricError::DegenerateFactor { index, size } => {
                write!(
                    f,
                    "factor {index} is too small for the flatness metric with cycle normalisation enabled: size={size} < 2"
                )
            }
            MetricError::NoActiveFactors => {
                write!(
                    f,
                    "flatness metric requires at least one factor with size >= 2"
                )
            }
            MetricError::Tensor(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MetricError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MetricError::Tensor(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TensorError> for MetricError {
    fn from(err: TensorError) -> Self {
        MetricError::Tensor(err)
    }
}

/// Tunable knobs for one metric run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlatnessOptions {
    /// Independent traversals averaged per factor. Trades accuracy for
    /// compute; see [`metric_flatness`].
    pub factor_repeats: usize,
    /// Maximum observations encoded per representation call. Affects only
    /// throughput and memory, never the numerical result.
    pub batch_size: usize,
    /// Explicit seed for every random draw. `None` defers to the
    /// `FLATLAND_DETERMINISTIC*` environment configuration.
    pub seed: Option<u64>,
    /// When set, a size-1 factor is a hard error instead of a zero-valued
    /// degenerate measure.
    pub cycle_fail: bool,
}

impl Default for FlatnessOptions {
    fn default() -> Self {
        Self {
            factor_repeats: 1024,
            batch_size: 64,
            seed: None,
            cycle_fail: false,
        }
    }
}

/// Final scalar scores of one metric run. All values are finite.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatnessScores {
    /// Blended default: l2 widths over l1 lengths.
    pub ave_flatness: f64,
    /// Pure Manhattan flatness.
    pub ave_flatness_l1: f64,
    /// Pure Euclidean flatness.
    pub ave_flatness_l2: f64,
    pub ave_width_l1: f64,
    pub ave_width_l2: f64,
    pub ave_length_l1: f64,
    pub ave_length_l2: f64,
}

impl FlatnessScores {
    /// Converts the scores into their canonical name/value mapping.
    pub fn into_map(self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("flatness.ave_flatness", self.ave_flatness),
            ("flatness.ave_flatness_l1", self.ave_flatness_l1),
            ("flatness.ave_flatness_l2", self.ave_flatness_l2),
            ("flatness.ave_width_l1", self.ave_width_l1),
            ("flatness.ave_width_l2", self.ave_width_l2),
            ("flatness.ave_length_l1", self.ave_length_l1),
            ("flatness.ave_length_l2", self.ave_length_l2),
        ])
    }
}

/// Per-norm running measures for one factor.
#[derive(Clone, Copy, Debug, Default)]
struct NormMeasures {
    ave_width: f32,
    ave_delta: f32,
}

impl NormMeasures {
    fn accumulate(&mut self, width: f32, delta: f32) {
        self.ave_width += width;
        self.ave_delta += delta;
    }

    fn averaged(self, repeats: usize) -> Self {
        let repeats = repeats as f32;
        Self {
            ave_width: self.ave_width / repeats,
            ave_delta: self.ave_delta / repeats,
        }
    }
}

/// Measures for one factor under both norms.
#[derive(Clone, Copy, Debug, Default)]
struct FactorMeasures {
    l1: NormMeasures,
    l2: NormMeasures,
}

/// Computes the flatness metric.
///
/// Approximately `total_dim_width / (ave_point_dist_along_dim *
/// num_points_along_dim)`, averaged per factor and across factors.
///
/// Complexity is `O(num_factors * ave_factor_size * factor_repeats)`
/// observations pulled from the dataset. `factor_repeats` trades accuracy
/// for compute: 64 repeats is accurate to roughly ±0.01, 128 to ±0.003 and
/// the default 1024 to ±0.001. `batch_size` must not affect the numerical
/// result, only throughput.
///
/// Size-1 factors carry no variation; they contribute zero-valued measures
/// and are excluded from every final aggregate. Errors raised inside the
/// representation function propagate unmodified.
pub fn metric_flatness<D, R>(
    dataset: &D,
    representation: &R,
    options: &FlatnessOptions,
) -> MetricResult<FlatnessScores>
where
    D: GroundTruthData + ?Sized,
    R: Representation + ?Sized,
{
    if options.factor_repeats == 0 {
        return Err(MetricError::InvalidArgument {
            label: "factor_repeats must be positive",
        });
    }
    if options.batch_size == 0 {
        return Err(MetricError::InvalidArgument {
            label: "batch_size must be positive",
        });
    }
    let factor_sizes = dataset.factor_sizes().to_vec();
    if factor_sizes.is_empty() {
        return Err(MetricError::InvalidArgument {
            label: "dataset reports zero factors",
        });
    }
    for (index, &size) in factor_sizes.iter().enumerate() {
        if size == 0 {
            return Err(MetricError::InvalidFactorSize { index, size });
        }
    }
    if !factor_sizes.iter().any(|&size| size > 1) {
        return Err(MetricError::NoActiveFactors);
    }

    let mut rng = determinism::rng_from_optional(options.seed, "fl-metrics/flatness");

    let mut measures = Vec::with_capacity(factor_sizes.len());
    for f_idx in 0..factor_sizes.len() {
        let factor = aggregate_along_factor(dataset, representation, f_idx, options, &mut rng)?;
        debug!(
            factor = f_idx,
            size = factor_sizes[f_idx],
            width_l2 = factor.l2.ave_width,
            delta_l2 = factor.l2.ave_delta,
            "aggregated traversal distances"
        );
        measures.push(factor);
    }

    // Estimated path length assuming uniform steps: (size - 1) * ave_delta.
    // This deliberately avoids walking the cyclic traversal directly, which
    // would re-introduce the discarded wrap edge.
    let widths_l1: Vec<f32> = measures.iter().map(|m| m.l1.ave_width).collect();
    let widths_l2: Vec<f32> = measures.iter().map(|m| m.l2.ave_width).collect();
    let lengths_l1: Vec<f32> = measures
        .iter()
        .zip(&factor_sizes)
        .map(|(m, &size)| (size - 1) as f32 * m.l1.ave_delta)
        .collect();
    let lengths_l2: Vec<f32> = measures
        .iter()
        .zip(&factor_sizes)
        .map(|(m, &size)| (size - 1) as f32 * m.l2.ave_delta)
        .collect();

    Ok(FlatnessScores {
        ave_flatness: compute_flatness(&widths_l2, &lengths_l1, &factor_sizes)?,
        ave_flatness_l1: compute_flatness(&widths_l1, &lengths_l1, &factor_sizes)?,
        ave_flatness_l2: compute_flatness(&widths_l2, &lengths_l2, &factor_sizes)?,
        ave_width_l1: mean_active(&widths_l1, &factor_sizes)?,
        ave_width_l2: mean_active(&widths_l2, &factor_sizes)?,
        ave_length_l1: mean_active(&lengths_l1, &factor_sizes)?,
        ave_length_l2: mean_active(&lengths_l2, &factor_sizes)?,
    })
}

/// Repeatedly encodes traversals along factor `f_idx` and averages their
/// width and consecutive-step measures under both norms.
fn aggregate_along_factor<D, R>(
    dataset: &D,
    representation: &R,
    f_idx: usize,
    options: &FlatnessOptions,
    rng: &mut StdRng,
) -> MetricResult<FactorMeasures>
where
    D: GroundTruthData + ?Sized,
    R: Representation + ?Sized,
{
    let size = dataset.factor_sizes()[f_idx];
    if size == 1 {
        if options.cycle_fail {
            return Err(MetricError::DegenerateFactor { index: f_idx, size });
        }
        // No distances are computable; report zero measures resident on the
        // representation's device, which must be queried rather than assumed.
        let device = probe_device(dataset, representation, rng)?;
        debug!(factor = f_idx, %device, "degenerate factor, zero measures");
        return Ok(FactorMeasures::default());
    }

    let mut totals = FactorMeasures::default();
    for _ in 0..options.factor_repeats {
        let traversal =
            encode_traversal(dataset, representation, f_idx, options.batch_size, rng)?;
        let (width, delta) = measure_traversal(&traversal, size, Norm::L1)?;
        totals.l1.accumulate(width, delta);
        let (width, delta) = measure_traversal(&traversal, size, Norm::L2)?;
        totals.l2.accumulate(width, delta);
    }
    Ok(FactorMeasures {
        l1: totals.l1.averaged(options.factor_repeats),
        l2: totals.l2.averaged(options.factor_repeats),
    })
}

/// Width and mean step size of one encoded traversal under one norm.
///
/// The traversal is cyclic, so of the `size` raw consecutive distances the
/// single largest is discarded: the closing wrap edge cannot be identified
/// directly, but it is never smaller than a true step. The remaining
/// `size - 1` deltas are averaged.
fn measure_traversal(traversal: &Tensor, size: usize, norm: Norm) -> MetricResult<(f32, f32)> {
    let width = diameter(traversal, norm)?;
    let raw_deltas = cyclic_deltas(traversal, norm)?;
    let kept = topk(&raw_deltas, size - 1, false)?;
    let delta = kept.iter().sum::<f32>() / kept.len() as f32;
    Ok((width, delta))
}

/// Builds and encodes the latent traversal for one factor: one random base
/// assignment, replicated, with column `f_idx` swept over `0..size` in order.
pub(crate) fn encode_traversal<D, R>(
    dataset: &D,
    representation: &R,
    f_idx: usize,
    batch_size: usize,
    rng: &mut StdRng,
) -> MetricResult<Tensor>
where
    D: GroundTruthData + ?Sized,
    R: Representation + ?Sized,
{
    let num_factors = dataset.num_factors();
    if f_idx >= num_factors {
        return Err(MetricError::FactorOutOfRange {
            index: f_idx,
            num_factors,
        });
    }
    if batch_size == 0 {
        return Err(MetricError::InvalidArgument {
            label: "batch_size must be positive",
        });
    }
    let size = dataset.factor_sizes()[f_idx];

    let base = dataset.sample_factors(1, rng)?;
    let mut grid = base.repeat_rows(size)?;
    let sweep: Vec<usize> = (0..size).collect();
    grid.set_column(f_idx, &sweep)?;

    // Chunks must stay in order: the row index encodes the swept factor value.
    let mut encoded = Vec::new();
    for chunk in grid.chunk_rows(batch_size)? {
        let batch = dataset.batch_from_factors(&chunk, BatchMode::Input)?;
        encoded.push(representation.encode(&batch)?);
    }
    Ok(Tensor::cat_rows(&encoded)?)
}

/// One throwaway single-sample encode to learn where the representation
/// places its outputs.
fn probe_device<D, R>(dataset: &D, representation: &R, rng: &mut StdRng) -> MetricResult<Device>
where
    D: GroundTruthData + ?Sized,
    R: Representation + ?Sized,
{
    let factors = dataset.sample_factors(1, rng)?;
    let batch = dataset.batch_from_factors(&factors, BatchMode::Input)?;
    Ok(representation.encode(&batch)?.device())
}

/// Mean of width/length ratios across active factors.
///
/// Width and length must be simultaneously zero or simultaneously nonzero
/// for well-formed measures; a factor violating that pairing is clipped to
/// zero flatness with a warning rather than poisoning the mean with NaN.
pub(crate) fn compute_flatness(
    widths: &[f32],
    lengths: &[f32],
    factor_sizes: &[usize],
) -> MetricResult<f64> {
    let mut total = 0.0f64;
    let mut active = 0usize;
    for (index, ((&width, &length), &size)) in
        widths.iter().zip(lengths).zip(factor_sizes).enumerate()
    {
        if size <= 1 {
            continue;
        }
        if !width.is_finite() {
            return Err(MetricError::Tensor(TensorError::NonFiniteValue {
                label: "flatness_width",
                value: width,
            }));
        }
        if !length.is_finite() {
            return Err(MetricError::Tensor(TensorError::NonFiniteValue {
                label: "flatness_length",
                value: length,
            }));
        }
        if (width == 0.0) != (length == 0.0) {
            warn!(
                factor = index,
                width, length, "width/length zero-pairing violated; clipping to zero flatness"
            );
        }
        if length > 0.0 {
            total += f64::from(width / length);
        }
        active += 1;
    }
    if active == 0 {
        return Err(MetricError::NoActiveFactors);
    }
    Ok(total / active as f64)
}

/// Mean over active factors only; size-1 factors never dilute aggregates.
fn mean_active(values: &[f32], factor_sizes: &[usize]) -> MetricResult<f64> {
    let mut total = 0.0f64;
    let mut active = 0usize;
    for (&value, &size) in values.iter().zip(factor_sizes) {
        if size <= 1 {
            continue;
        }
        total += f64::from(value);
        active += 1;
    }
    if active == 0 {
        return Err(MetricError::NoActiveFactors);
    }
    Ok(total / active as f64)
}
