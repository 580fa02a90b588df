// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of Flatland — Licensed under AGPL-3.0-or-later.

//! Nearest-neighbour and cyclic-step distance primitives.

use fl_tensor::{topk, Norm, PureResult, Tensor, TensorError};

/// Dense k-nearest-neighbour distances between two row sets.
///
/// Computes the full all-pairs distance matrix and keeps, per row of `x`, the
/// `k` best distances into `y` (smallest by default, largest when requested),
/// sorted best-first. The dense matrix is acceptable here because the row
/// counts are one factor's cardinality, never the full dataset size.
///
/// Preconditions are validated before any computation: `0 < k <= y.rows()`
/// and matching column counts.
pub fn knn(x: &Tensor, y: &Tensor, k: usize, largest: bool, norm: Norm) -> PureResult<Tensor> {
    if k == 0 || k > y.rows() {
        return Err(TensorError::TopKOutOfRange { k, len: y.rows() });
    }
    if x.cols() != y.cols() {
        return Err(TensorError::ShapeMismatch {
            left: x.shape(),
            right: y.shape(),
        });
    }

    let mut out = Vec::with_capacity(x.rows() * k);
    let mut distances = vec![0.0f32; y.rows()];
    for r in 0..x.rows() {
        let anchor = x.row(r)?;
        for (slot, other) in distances.iter_mut().zip(0..y.rows()) {
            *slot = norm.distance(anchor, y.row(other)?)?;
        }
        out.extend(topk(&distances, k, largest)?);
    }
    Tensor::from_vec(x.rows(), k, out)
}

/// Distance from every row to its cyclic successor (`i` to `(i+1) % rows`).
///
/// The traversal is treated as a closed loop, so a tensor with `n` rows
/// yields `n` raw deltas including the wrap-around closing edge.
pub fn cyclic_deltas(z: &Tensor, norm: Norm) -> PureResult<Vec<f32>> {
    let rows = z.rows();
    let mut deltas = Vec::with_capacity(rows);
    for i in 0..rows {
        deltas.push(norm.distance(z.row(i)?, z.row((i + 1) % rows)?)?);
    }
    Ok(deltas)
}

/// Diameter of a point set: the largest pairwise distance under `norm`.
pub fn diameter(z: &Tensor, norm: Norm) -> PureResult<f32> {
    let extremes = knn(z, z, 1, true, norm)?;
    Ok(extremes
        .data()
        .iter()
        .fold(0.0f32, |best, &value| best.max(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> Tensor {
        // Points 0, 1, 3 on a 1-D axis.
        Tensor::from_vec(3, 1, vec![0.0, 1.0, 3.0]).unwrap()
    }

    #[test]
    fn knn_smallest_matches_manual_neighbours() {
        let z = line();
        let nearest = knn(&z, &z, 2, false, Norm::L2).unwrap();
        // Per row: self (0) then the closest other point.
        assert_eq!(nearest.shape(), (3, 2));
        assert_eq!(nearest.row(0).unwrap(), &[0.0, 1.0]);
        assert_eq!(nearest.row(1).unwrap(), &[0.0, 1.0]);
        assert_eq!(nearest.row(2).unwrap(), &[0.0, 2.0]);
    }

    #[test]
    fn knn_largest_with_k1_yields_per_row_extremes() {
        let z = line();
        let extremes = knn(&z, &z, 1, true, Norm::L1).unwrap();
        assert_eq!(extremes.data(), &[3.0, 2.0, 3.0]);
        assert!((diameter(&z, Norm::L1).unwrap() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn knn_fails_fast_on_bad_arguments() {
        let z = line();
        assert!(matches!(
            knn(&z, &z, 0, false, Norm::L2),
            Err(TensorError::TopKOutOfRange { k: 0, len: 3 })
        ));
        assert!(matches!(
            knn(&z, &z, 4, false, Norm::L2),
            Err(TensorError::TopKOutOfRange { k: 4, len: 3 })
        ));
        let wider = Tensor::zeros(3, 2).unwrap();
        assert!(matches!(
            knn(&z, &wider, 1, false, Norm::L2),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn cyclic_deltas_include_the_wrap_edge() {
        let z = line();
        let deltas = cyclic_deltas(&z, Norm::L2).unwrap();
        assert_eq!(deltas, vec![1.0, 2.0, 3.0]);
    }
}
