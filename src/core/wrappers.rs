//! Trait implementations for `faer::Mat` and slices.
//!
//! These let a plain dense matrix stand in for a boundary integral operator
//! (tests, small direct solves) and give the solvers one rayon-backed inner
//! product over `[T]`.

use crate::core::traits::{InfluenceOperator, InnerProduct, MatVec, Real};
use faer::Mat;
use rayon::prelude::*;

/// Computes `y = A * x` for a dense matrix.
impl<T: Real> MatVec<[T]> for Mat<T> {
    fn matvec(&self, x: &[T], y: &mut [T]) {
        assert_eq!(self.nrows(), y.len(), "Output vector y has incorrect length");
        assert_eq!(self.ncols(), x.len(), "Input vector x has incorrect length");
        y.par_iter_mut().enumerate().for_each(|(i, yi)| {
            *yi = (0..self.ncols()).map(|j| self[(i, j)] * x[j]).sum();
        });
    }
}

impl<T: Real> InfluenceOperator<T> for Mat<T> {
    fn dimension(&self) -> usize {
        assert_eq!(self.nrows(), self.ncols(), "influence operators are square");
        self.nrows()
    }
    fn entry(&self, i: usize, j: usize) -> T {
        self[(i, j)]
    }
}

/// Inner product and norm for slices, parallel over rayon.
impl<T: Real> InnerProduct<[T]> for () {
    type Scalar = T;
    fn dot(&self, x: &[T], y: &[T]) -> T {
        assert_eq!(x.len(), y.len(), "Vectors must have the same length");
        x.par_iter()
            .zip(y.par_iter())
            .map(|(xi, yi)| *xi * *yi)
            .reduce(|| T::zero(), |acc, v| acc + v)
    }
    fn norm(&self, x: &[T]) -> T {
        x.par_iter()
            .map(|xi| *xi * *xi)
            .reduce(|| T::zero(), |acc, v| acc + v)
            .sqrt()
    }
}

/// r = b - A x
pub fn residual<T: Real, A: InfluenceOperator<T> + ?Sized>(a: &A, b: &[T], x: &[T]) -> Vec<T> {
    let mut r = vec![T::zero(); b.len()];
    a.matvec(x, &mut r[..]);
    r.iter_mut().zip(b).for_each(|(ri, &bi)| *ri = bi - *ri);
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn dense_matvec_and_residual() {
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 2.0 } else { 1.0 });
        let x = [1.0, 2.0];
        let mut y = [0.0; 2];
        a.matvec(&x[..], &mut y[..]);
        assert_eq!(y, [4.0, 5.0]);
        let r = residual(&a, &[4.0, 6.0], &x);
        assert_abs_diff_eq!(r[0], 0.0);
        assert_abs_diff_eq!(r[1], 1.0);
        assert_abs_diff_eq!(().norm(&r[..]), 1.0);
    }
}
