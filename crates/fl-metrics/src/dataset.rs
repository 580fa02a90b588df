// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of Flatland — Licensed under AGPL-3.0-or-later.

//! Ground-truth data contracts consumed by the flatness estimator.

use fl_tensor::{PureResult, Tensor, TensorError};
use rand::rngs::StdRng;
use rand::Rng;

/// Which flavour of observation a batch request should produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchMode {
    /// Model inputs, the only flavour the flatness metric consumes.
    Input,
    /// Reconstruction targets.
    Target,
}

/// An owned grid of factor assignments, one row per sample and one column per
/// generative factor.
#[derive(Clone, Debug, PartialEq)]
pub struct FactorGrid {
    rows: usize,
    cols: usize,
    data: Vec<usize>,
}

impl FactorGrid {
    /// Builds a grid from row-major data.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<usize>) -> PureResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let expected = rows * cols;
        if expected != data.len() {
            return Err(TensorError::DataLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Number of assignment rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of factors per row.
    pub fn num_factors(&self) -> usize {
        self.cols
    }

    /// Returns one assignment row.
    pub fn row(&self, row: usize) -> PureResult<&[usize]> {
        if row >= self.rows {
            return Err(TensorError::RowOutOfBounds {
                row,
                rows: self.rows,
            });
        }
        let start = row * self.cols;
        Ok(&self.data[start..start + self.cols])
    }

    /// Repeats every row `times` times, preserving row order.
    pub fn repeat_rows(&self, times: usize) -> PureResult<Self> {
        if times == 0 {
            return Err(TensorError::InvalidValue {
                label: "factor_grid_repeat_times",
            });
        }
        let mut data = Vec::with_capacity(self.rows * times * self.cols);
        for row in self.data.chunks(self.cols) {
            for _ in 0..times {
                data.extend_from_slice(row);
            }
        }
        Self::from_vec(self.rows * times, self.cols, data)
    }

    /// Overwrites one column with the provided values, row by row.
    pub fn set_column(&mut self, column: usize, values: &[usize]) -> PureResult<()> {
        if column >= self.cols {
            return Err(TensorError::InvalidValue {
                label: "factor_grid_column",
            });
        }
        if values.len() != self.rows {
            return Err(TensorError::DataLength {
                expected: self.rows,
                got: values.len(),
            });
        }
        for (row, value) in values.iter().enumerate() {
            self.data[row * self.cols + column] = *value;
        }
        Ok(())
    }

    /// Splits the grid into consecutive row chunks of at most `chunk` rows.
    pub fn chunk_rows(&self, chunk: usize) -> PureResult<Vec<FactorGrid>> {
        if chunk == 0 {
            return Err(TensorError::InvalidValue {
                label: "factor_grid_chunk_size",
            });
        }
        self.data
            .chunks(chunk * self.cols)
            .map(|piece| Self::from_vec(piece.len() / self.cols, self.cols, piece.to_vec()))
            .collect()
    }
}

/// Contract for ground-truth factored data providers.
///
/// Implementations expose their factor structure and can materialise
/// model-input batches for arbitrary factor assignments. Random draws go
/// through the caller-supplied RNG so the estimator stays reproducible.
pub trait GroundTruthData {
    /// Ordered cardinalities of the generative factors; every entry is >= 1.
    fn factor_sizes(&self) -> &[usize];

    /// Number of generative factors.
    fn num_factors(&self) -> usize {
        self.factor_sizes().len()
    }

    /// Draws `count` independent uniform factor assignments.
    fn sample_factors(&self, count: usize, rng: &mut StdRng) -> PureResult<FactorGrid>;

    /// Materialises the observations for the given factor assignments.
    fn batch_from_factors(&self, factors: &FactorGrid, mode: BatchMode) -> PureResult<Tensor>;
}

/// Minimal in-memory ground-truth provider whose observation for a factor
/// assignment is the assignment itself, cast to `f32` columns.
///
/// Useful as a stand-in dataset when studying the estimator and as the
/// backbone of the test suite.
#[derive(Clone, Debug)]
pub struct FactorTableData {
    factor_sizes: Vec<usize>,
}

impl FactorTableData {
    /// Builds a provider over the given factor cardinalities.
    pub fn new(factor_sizes: Vec<usize>) -> PureResult<Self> {
        if factor_sizes.is_empty() {
            return Err(TensorError::EmptyInput("FactorTableData::factor_sizes"));
        }
        if factor_sizes.iter().any(|&size| size == 0) {
            return Err(TensorError::InvalidValue {
                label: "factor_size_zero",
            });
        }
        Ok(Self { factor_sizes })
    }
}

impl GroundTruthData for FactorTableData {
    fn factor_sizes(&self) -> &[usize] {
        &self.factor_sizes
    }

    fn sample_factors(&self, count: usize, rng: &mut StdRng) -> PureResult<FactorGrid> {
        if count == 0 {
            return Err(TensorError::InvalidValue {
                label: "sample_factors_count",
            });
        }
        let cols = self.factor_sizes.len();
        let mut data = Vec::with_capacity(count * cols);
        for _ in 0..count {
            for &size in &self.factor_sizes {
                data.push(rng.gen_range(0..size));
            }
        }
        FactorGrid::from_vec(count, cols, data)
    }

    fn batch_from_factors(&self, factors: &FactorGrid, _mode: BatchMode) -> PureResult<Tensor> {
        Tensor::from_fn(factors.rows(), factors.num_factors(), |r, c| {
            factors
                .row(r)
                .map(|row| row[c] as f32)
                .unwrap_or_default()
        })
    }
}
