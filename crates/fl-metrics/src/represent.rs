// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of Flatland — Licensed under AGPL-3.0-or-later.

//! Representation-function contract: the externally trained encoder the
//! metric probes.

use fl_tensor::{PureResult, Tensor, TensorError};

/// A pure mapping from an observation batch to a latent-code batch.
///
/// Implementations are assumed deterministic for the duration of a metric
/// run (no dropout or other stochastic behaviour). Failures propagate to the
/// caller unmodified; the estimator never retries or suppresses them.
pub trait Representation {
    /// Encodes a `(batch, input_dim)` tensor into `(batch, latent_dim)`.
    fn encode(&self, batch: &Tensor) -> PureResult<Tensor>;
}

impl<F> Representation for F
where
    F: Fn(&Tensor) -> PureResult<Tensor>,
{
    fn encode(&self, batch: &Tensor) -> PureResult<Tensor> {
        self(batch)
    }
}

/// Linear encoder applying a fixed weight matrix to every observation.
#[derive(Clone, Debug)]
pub struct LinearRepresentation {
    weights: Tensor,
}

impl LinearRepresentation {
    /// Wraps an `(input_dim, latent_dim)` weight matrix.
    pub fn new(weights: Tensor) -> Self {
        Self { weights }
    }

    /// Random uniform weights in `[-scale, scale)`, reproducible when `seed`
    /// is provided.
    pub fn random(
        input_dim: usize,
        latent_dim: usize,
        scale: f32,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        if scale <= 0.0 {
            return Err(TensorError::InvalidValue {
                label: "linear_representation_scale",
            });
        }
        Ok(Self {
            weights: Tensor::random_uniform(input_dim, latent_dim, -scale, scale, seed)?,
        })
    }

    /// Latent dimensionality of the encoder output.
    pub fn latent_dim(&self) -> usize {
        self.weights.cols()
    }
}

impl Representation for LinearRepresentation {
    fn encode(&self, batch: &Tensor) -> PureResult<Tensor> {
        batch.matmul(&self.weights)
    }
}
