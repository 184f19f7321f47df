//! Dense materialization of influence operators on top of Faer.

use crate::core::traits::{InfluenceOperator, Real};
use faer::Mat;
use rayon::prelude::*;

/// Evaluates every entry of `a` into a column-major `faer::Mat<f64>`.
///
/// Columns are filled in parallel from [`InfluenceOperator::entry_f64`], so
/// a single-precision operator still factors its double-precision entries.
pub fn materialize<T: Real, A: InfluenceOperator<T> + ?Sized>(a: &A) -> Mat<f64> {
    let n = a.dimension();
    let mut data = vec![0.0f64; n * n];
    data.par_chunks_mut(n.max(1)).enumerate().for_each(|(j, col)| {
        for (i, c) in col.iter_mut().enumerate() {
            *c = a.entry_f64(i, j);
        }
    });
    Mat::from_fn(n, n, |i, j| data[j * n + i])
}

/// Extracts the principal submatrix on `indices` into a `faer::Mat<f64>`.
pub fn submatrix<T: Real, A: InfluenceOperator<T> + ?Sized>(a: &A, indices: &[usize]) -> Mat<f64> {
    let m = indices.len();
    Mat::from_fn(m, m, |r, c| a.entry_f64(indices[r], indices[c]))
}
