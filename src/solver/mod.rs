//! Direct and iterative solvers for the collocation system.
//!
//! Every solver takes the operator, the right-hand side and an initial
//! guess, and reports through a [`SolveMonitor`]. Reaching the iteration cap
//! is not an error: the statistics say so and `x` holds the last iterate.
//!
//! | solver | residual norm |
//! |---|---|
//! | [`GaussianElimination`], [`BiCgStabSolver`], [`GmresSolver`] | ‖b − Ax‖₂ / ‖b‖₂ |
//! | [`GaussSeidel`], [`RobinHood`], [`MultiElementRobinHood`] | ‖b − Ax‖∞ / ‖b‖∞ |

pub mod bicgstab;
pub mod gauss_seidel;
pub mod gaussian_elimination;
pub mod gmres;
pub mod monitor;
pub mod multi_element_robin_hood;
pub mod robin_hood;

pub use bicgstab::BiCgStabSolver;
pub use gauss_seidel::GaussSeidel;
pub use gaussian_elimination::GaussianElimination;
pub use gmres::GmresSolver;
pub use monitor::{CancellationToken, SolveMonitor};
pub use multi_element_robin_hood::MultiElementRobinHood;
pub use robin_hood::RobinHood;

use crate::core::traits::{InfluenceOperator, Real};
use crate::error::BemError;
use crate::operator::PartitionedOperator;
use crate::parallel::Comm;
use crate::utils::convergence::{ResidualNorm, SolveStats, SolveStatus};

/// Common interface for any direct or iterative solver.
pub trait LinearSolver<T: Real> {
    fn name(&self) -> &'static str;

    /// Norm the convergence test is measured in.
    fn residual_norm(&self) -> ResidualNorm;

    /// Solve A·x = b, starting from the contents of `x`.
    fn solve<A: InfluenceOperator<T> + ?Sized>(
        &mut self,
        a: &A,
        b: &[T],
        x: &mut [T],
        monitor: &mut SolveMonitor<'_, T>,
    ) -> Result<SolveStats<T>, BemError>;
}

/// `y = A·x` with rows split over the ranks of `comm`.
pub(crate) fn apply<T: Real, A: InfluenceOperator<T> + ?Sized>(a: &A, comm: &dyn Comm, x: &[T], y: &mut [T]) {
    PartitionedOperator::new::<T>(a, comm).apply(x, y);
}

/// r = b − A·x on every rank.
pub(crate) fn residual<T: Real, A: InfluenceOperator<T> + ?Sized>(a: &A, comm: &dyn Comm, b: &[T], x: &[T]) -> Vec<T> {
    let mut r = vec![T::zero(); b.len()];
    apply(a, comm, x, &mut r);
    r.iter_mut().zip(b).for_each(|(ri, &bi)| *ri = bi - *ri);
    r
}

/// Diagonal of `a`, rejecting exact zeros.
pub(crate) fn checked_diagonal<T: Real, A: InfluenceOperator<T> + ?Sized>(a: &A) -> Result<Vec<T>, BemError> {
    (0..a.dimension())
        .map(|i| {
            let d = a.diagonal(i);
            if d == T::zero() || !d.is_finite() {
                Err(BemError::DegenerateGeometry(format!("diagonal entry {i} is {d}")))
            } else {
                Ok(d)
            }
        })
        .collect()
}

/// Handles `b = 0`: the solution is zero and the solve is converged.
pub(crate) fn zero_rhs<T: Real>(
    norm: ResidualNorm,
    b: &[T],
    x: &mut [T],
    monitor: &mut SolveMonitor<'_, T>,
) -> Option<SolveStats<T>> {
    if norm.measure(b) > T::zero() {
        return None;
    }
    x.iter_mut().for_each(|v| *v = T::zero());
    Some(monitor.finish(SolveStats::new(0, T::zero(), SolveStatus::Converged), x))
}

pub(crate) fn check_lengths<T>(n: usize, b: &[T], x: &[T]) -> Result<(), BemError> {
    if b.len() != n || x.len() != n {
        return Err(BemError::InvalidConfig(format!(
            "vector lengths b = {}, x = {} do not match dimension {n}",
            b.len(),
            x.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::observer::ObserverSet;
    use crate::parallel::LocalComm;
    use faer::Mat;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Diagonally dominant non-symmetric matrix and a right-hand side with a
    /// known solution.
    pub fn dominant_system(n: usize, seed: u64) -> (Mat<f64>, Vec<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let entries: Vec<f64> = (0..n * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let diag: Vec<f64> = (0..n).map(|_| n as f64 + rng.gen_range(1.0..2.0)).collect();
        let a = Mat::from_fn(n, n, |i, j| if i == j { diag[i] } else { entries[i * n + j] });
        let x: Vec<f64> = (0..n).map(|i| 1.0 + i as f64 / n as f64).collect();
        let mut b = vec![0.0; n];
        crate::core::traits::MatVec::matvec(&a, &x[..], &mut b[..]);
        (a, b, x)
    }

    pub fn run<S: LinearSolver<f64>>(solver: &mut S, a: &Mat<f64>, b: &[f64]) -> (Vec<f64>, SolveStats<f64>) {
        run_on(&LocalComm::new(), solver, a, b)
    }

    pub fn run_on<S: LinearSolver<f64>>(
        comm: &dyn Comm,
        solver: &mut S,
        a: &Mat<f64>,
        b: &[f64],
    ) -> (Vec<f64>, SolveStats<f64>) {
        let mut observers = ObserverSet::new();
        let mut monitor = SolveMonitor::new(&mut observers, comm);
        let mut x = vec![0.0; b.len()];
        let stats = solver.solve(a, b, &mut x, &mut monitor).unwrap();
        (x, stats)
    }
}
