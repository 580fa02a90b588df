// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of Flatland — Licensed under AGPL-3.0-or-later.

//! Flatness metric for learned latent spaces.
//!
//! Given a ground-truth factored dataset and a trained encoder, the metric
//! estimates how flat and evenly spaced the induced latent manifold is along
//! each generative factor: it sweeps one factor at a time while holding the
//! rest fixed, encodes the traversal, and compares the diameter of the
//! resulting point set against its estimated path length. A perfectly
//! straight, uniformly spaced traversal scores 1.0.
//!
//! The estimator is a pure function over its two collaborators — nothing is
//! cached between calls and every random draw flows through an explicit,
//! seedable RNG.

pub mod dataset;
pub mod distance;
pub mod flatness;
pub mod registry;
pub mod represent;

pub use self::dataset::{BatchMode, FactorGrid, FactorTableData, GroundTruthData};
pub use self::distance::{cyclic_deltas, diameter, knn};
pub use self::flatness::{
    metric_flatness, FlatnessOptions, FlatnessScores, MetricError, MetricResult,
};
pub use self::represent::{LinearRepresentation, Representation};
