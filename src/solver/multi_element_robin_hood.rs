//! Multi-element Robin Hood: greedy block residual correction.
//!
//! Instead of a single pivot, every iteration selects the `subspace_dimension`
//! rows with the largest residuals and solves the small dense system that
//! zeroes all of them at once. The block system is factorized in `f64` with
//! Faer's fully pivoted LU. The method runs replicated on every rank.

use super::robin_hood::argmax_abs;
use super::{LinearSolver, SolveMonitor, check_lengths, checked_diagonal, residual, zero_rhs};
use crate::core::traits::{InfluenceOperator, Real};
use crate::error::BemError;
use crate::matrix::submatrix;
use crate::utils::convergence::{Convergence, ResidualNorm, SolveStats, SolveStatus};
use faer::linalg::solvers::{FullPivLu, SolveCore};
use faer::{Conj, MatMut};
use std::ops::ControlFlow;

pub struct MultiElementRobinHood<T> {
    pub conv: Convergence<T>,
    pub check_interval: usize,
    pub subspace_dimension: usize,
}

impl<T: Real> MultiElementRobinHood<T> {
    pub fn new(tol: T, max_iters: usize, check_interval: usize, subspace_dimension: usize) -> Self {
        MultiElementRobinHood {
            conv: Convergence { tol, max_iters },
            check_interval: check_interval.max(1),
            subspace_dimension: subspace_dimension.max(1),
        }
    }
}

/// Indices of the `m` largest |r|, by decreasing magnitude then index.
fn largest_residuals<T: Real>(r: &[T], m: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..r.len()).collect();
    idx.sort_by(|&i, &j| r[j].abs().partial_cmp(&r[i].abs()).unwrap_or(std::cmp::Ordering::Equal).then(i.cmp(&j)));
    idx.truncate(m);
    idx.sort_unstable();
    idx
}

impl<T: Real> LinearSolver<T> for MultiElementRobinHood<T> {
    fn name(&self) -> &'static str {
        "multi-element-robin-hood"
    }

    fn residual_norm(&self) -> ResidualNorm {
        ResidualNorm::Max
    }

    fn solve<A: InfluenceOperator<T> + ?Sized>(
        &mut self,
        a: &A,
        b: &[T],
        x: &mut [T],
        monitor: &mut SolveMonitor<'_, T>,
    ) -> Result<SolveStats<T>, BemError> {
        let n = a.dimension();
        check_lengths(n, b, x)?;
        let start = monitor.initialize(self.name(), x);
        if let Some(stats) = zero_rhs(ResidualNorm::Max, b, x, monitor) {
            return Ok(stats);
        }
        checked_diagonal(a)?;
        let comm = monitor.comm();
        let m = self.subspace_dimension.min(n);
        let b_norm = ResidualNorm::Max.measure(b);

        let mut r = residual(a, comm, b, x);
        let mut column = vec![T::zero(); n];
        let mut rel = self.conv.relative(argmax_abs(&r).0, b_norm);
        let mut status = if rel <= self.conv.tol { SolveStatus::Converged } else { SolveStatus::MaxIterationsReached };
        let mut it = start;
        while status != SolveStatus::Converged && it < self.conv.max_iters {
            it += 1;
            let block = largest_residuals(&r, m);
            let sub = submatrix(a, &block);
            let lu = FullPivLu::new(sub.as_ref());
            let mut delta: Vec<f64> = block.iter().map(|&i| r[i].to_f64_lossy()).collect();
            lu.solve_in_place_with_conj(Conj::No, MatMut::from_column_major_slice_mut(&mut delta, block.len(), 1));
            if delta.iter().any(|d| !d.is_finite()) {
                return Err(BemError::Breakdown {
                    solver: "multi-element-robin-hood",
                    reason: format!("singular {}x{} block at rows {:?}", block.len(), block.len(), block),
                });
            }
            for (&k, &d) in block.iter().zip(&delta) {
                let d = T::from_f64_lossy(d);
                x[k] += d;
                a.column_into(k, 0..n, &mut column);
                r.iter_mut().zip(&column).for_each(|(ri, &c)| *ri -= c * d);
            }

            if it % self.check_interval == 0 || it == self.conv.max_iters {
                rel = self.conv.relative(argmax_abs(&r).0, b_norm);
                if let ControlFlow::Break(s) = monitor.record(it, rel, x) {
                    status = s;
                    break;
                }
                if rel <= self.conv.tol {
                    r = residual(a, comm, b, x);
                    rel = self.conv.relative(ResidualNorm::Max.measure(&r), b_norm);
                    if rel <= self.conv.tol {
                        status = SolveStatus::Converged;
                    }
                }
            }
        }
        Ok(monitor.finish(SolveStats::new(it, rel, status), x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::testing::{dominant_system, run};
    use approx::assert_abs_diff_eq;

    #[test]
    fn picks_largest_block() {
        assert_eq!(largest_residuals(&[0.1, -5.0, 2.0, 5.0, 1.0], 3), vec![1, 2, 3]);
    }

    #[test]
    fn full_block_is_a_direct_solve() {
        let (a, b, x_true) = dominant_system(6, 11);
        let (x, stats) = run(&mut MultiElementRobinHood::new(1e-10, 10, 1, 6), &a, &b);
        assert!(stats.converged);
        assert_eq!(stats.iterations, 1);
        for (xi, ei) in x.iter().zip(&x_true) {
            assert_abs_diff_eq!(*xi, *ei, epsilon = 1e-10);
        }
    }

    #[test]
    fn converges_with_small_blocks() {
        let (a, b, x_true) = dominant_system(10, 12);
        let (x, stats) = run(&mut MultiElementRobinHood::new(1e-10, 2000, 5, 3), &a, &b);
        assert!(stats.converged, "{stats:?}");
        for (xi, ei) in x.iter().zip(&x_true) {
            assert_abs_diff_eq!(*xi, *ei, epsilon = 1e-8);
        }
    }
}
