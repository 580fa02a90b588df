// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of Flatland — Licensed under AGPL-3.0-or-later.

//! p-norm distances and top-k selection over raw slices.

use crate::dense::{PureResult, TensorError};
use core::fmt;
use serde::{Deserialize, Serialize};

/// Vector norm used when measuring latent distances.
///
/// For the row vectors this crate works with, `Frobenius` coincides with
/// `L2`; it exists as its own variant because matrix-valued latents keep the
/// distinction meaningful.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Norm {
    /// Sum of absolute differences (Manhattan).
    L1,
    /// Euclidean distance.
    L2,
    /// Frobenius norm; equal to `L2` when applied to vectors.
    Frobenius,
}

impl Norm {
    /// Norm of a single vector.
    pub fn magnitude(&self, values: &[f32]) -> f32 {
        match self {
            Norm::L1 => values.iter().map(|v| v.abs()).sum(),
            Norm::L2 | Norm::Frobenius => values.iter().map(|v| v * v).sum::<f32>().sqrt(),
        }
    }

    /// Distance between two equally sized vectors under this norm, i.e. the
    /// magnitude of their elementwise difference.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> PureResult<f32> {
        if a.len() != b.len() {
            return Err(TensorError::DataLength {
                expected: a.len(),
                got: b.len(),
            });
        }
        let diff: Vec<f32> = a.iter().zip(b.iter()).map(|(x, y)| x - y).collect();
        Ok(self.magnitude(&diff))
    }
}

impl fmt::Display for Norm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Norm::L1 => f.write_str("l1"),
            Norm::L2 => f.write_str("l2"),
            Norm::Frobenius => f.write_str("fro"),
        }
    }
}

/// Selects the `k` largest or smallest values from `values`, sorted from the
/// best match down (descending for `largest`, ascending otherwise).
///
/// Fails before touching the data when `k` is zero or exceeds the population.
pub fn topk(values: &[f32], k: usize, largest: bool) -> PureResult<Vec<f32>> {
    if k == 0 || k > values.len() {
        return Err(TensorError::TopKOutOfRange {
            k,
            len: values.len(),
        });
    }
    let mut sorted = values.to_vec();
    if largest {
        sorted.sort_unstable_by(|a, b| b.total_cmp(a));
    } else {
        sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    }
    sorted.truncate(k);
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnitude_matches_hand_calculation() {
        let v = [3.0, -4.0];
        assert!((Norm::L1.magnitude(&v) - 7.0).abs() < 1e-6);
        assert!((Norm::L2.magnitude(&v) - 5.0).abs() < 1e-6);
        assert_eq!(Norm::Frobenius.magnitude(&v), Norm::L2.magnitude(&v));
    }

    #[test]
    fn l1_and_l2_distances_match_hand_calculation() {
        let a = [1.0, -2.0, 3.0];
        let b = [0.0, 1.0, 1.0];
        assert!((Norm::L1.distance(&a, &b).unwrap() - 6.0).abs() < 1e-6);
        let expected_l2 = (1.0f32 + 9.0 + 4.0).sqrt();
        assert!((Norm::L2.distance(&a, &b).unwrap() - expected_l2).abs() < 1e-6);
        assert_eq!(
            Norm::Frobenius.distance(&a, &b).unwrap(),
            Norm::L2.distance(&a, &b).unwrap()
        );
    }

    #[test]
    fn distance_rejects_length_mismatch() {
        assert!(Norm::L1.distance(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn topk_selects_and_sorts_both_directions() {
        let values = [3.0, 1.0, 4.0, 1.5, 9.0];
        assert_eq!(topk(&values, 2, true).unwrap(), vec![9.0, 4.0]);
        assert_eq!(topk(&values, 3, false).unwrap(), vec![1.0, 1.5, 3.0]);
    }

    #[test]
    fn topk_rejects_out_of_range_k() {
        let values = [1.0, 2.0];
        assert!(matches!(
            topk(&values, 0, true),
            Err(TensorError::TopKOutOfRange { k: 0, len: 2 })
        ));
        assert!(matches!(
            topk(&values, 3, false),
            Err(TensorError::TopKOutOfRange { k: 3, len: 2 })
        ));
    }
}
