//! Core linear-algebra traits for electrobem.

use num_traits::{Float, FromPrimitive, ToPrimitive};
use std::fmt::{Debug, Display};
use std::iter::Sum;
use std::ops::{AddAssign, SubAssign};

/// Floating point scalar a solve runs in (`f32` or `f64`).
pub trait Real:
    Float + FromPrimitive + ToPrimitive + AddAssign + SubAssign + Sum + Debug + Display + Send + Sync + 'static
{
    fn from_f64_lossy(x: f64) -> Self {
        Self::from_f64(x).unwrap_or_else(Self::nan)
    }

    fn to_f64_lossy(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

impl<T> Real for T where
    T: Float + FromPrimitive + ToPrimitive + AddAssign + SubAssign + Sum + Debug + Display + Send + Sync + 'static
{
}

/// Matrix–vector product: y ← A x.
pub trait MatVec<V: ?Sized> {
    /// Compute y = A · x.
    fn matvec(&self, x: &V, y: &mut V);
}

/// Inner products & norms.
pub trait InnerProduct<V: ?Sized> {
    /// Associated scalar type.
    type Scalar: Copy + PartialOrd;
    /// Compute dot(x, y).
    fn dot(&self, x: &V, y: &V) -> Self::Scalar;
    /// Compute ‖x‖₂.
    fn norm(&self, x: &V) -> Self::Scalar;
}

/// A square linear operator whose entries can be queried one at a time.
///
/// Boundary element matrices are dense and usually too large to store, so
/// solvers only see entries and products through this trait. Implementors
/// must be safe to share between threads: entries are evaluated in parallel.
pub trait InfluenceOperator<T>: MatVec<[T]> + Sync {
    fn dimension(&self) -> usize;

    /// A[i][j]. Panics when either index is out of range.
    fn entry(&self, i: usize, j: usize) -> T;

    /// A[i][j] in `f64`. Operators that evaluate entries in double
    /// precision override this to skip the round trip through `T`.
    fn entry_f64(&self, i: usize, j: usize) -> f64
    where
        T: Real,
    {
        self.entry(i, j).to_f64_lossy()
    }

    fn diagonal(&self, i: usize) -> T {
        self.entry(i, i)
    }

    /// Column `j` restricted to `rows`.
    fn column_into(&self, j: usize, rows: std::ops::Range<usize>, out: &mut [T]) {
        for (o, i) in out.iter_mut().zip(rows) {
            *o = self.entry(i, j);
        }
    }

    /// `y = A[rows, :] · x`, with `y.len() == rows.len()`.
    fn matvec_rows(&self, rows: std::ops::Range<usize>, x: &[T], y: &mut [T])
    where
        T: Real,
    {
        for (yi, i) in y.iter_mut().zip(rows) {
            *yi = x.iter().enumerate().map(|(j, &xj)| self.entry(i, j) * xj).sum();
        }
    }
}

impl<T, A: InfluenceOperator<T> + ?Sized> InfluenceOperator<T> for &A {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }
    fn entry(&self, i: usize, j: usize) -> T {
        (**self).entry(i, j)
    }
    fn entry_f64(&self, i: usize, j: usize) -> f64
    where
        T: Real,
    {
        (**self).entry_f64(i, j)
    }
    fn diagonal(&self, i: usize) -> T {
        (**self).diagonal(i)
    }
    fn column_into(&self, j: usize, rows: std::ops::Range<usize>, out: &mut [T]) {
        (**self).column_into(j, rows, out)
    }
    fn matvec_rows(&self, rows: std::ops::Range<usize>, x: &[T], y: &mut [T])
    where
        T: Real,
    {
        (**self).matvec_rows(rows, x, y)
    }
}

impl<T, A: MatVec<[T]> + ?Sized> MatVec<[T]> for &A {
    fn matvec(&self, x: &[T], y: &mut [T]) {
        (**self).matvec(x, y)
    }
}
