//! Gauss–Seidel relaxation.
//!
//! One iteration is one forward sweep over the rows. The residual tracked
//! during a sweep is the largest pre-update row residual; once it drops
//! below tolerance the true residual is computed before convergence is
//! declared. Under a cluster communicator each rank sweeps its own rows
//! against the iterate gathered at the end of the previous sweep.

use super::{LinearSolver, SolveMonitor, check_lengths, checked_diagonal, residual, zero_rhs};
use crate::core::traits::{InfluenceOperator, Real};
use crate::error::BemError;
use crate::utils::convergence::{Convergence, ResidualNorm, SolveStats, SolveStatus};
use rayon::prelude::*;
use std::ops::ControlFlow;

pub struct GaussSeidel<T> {
    pub conv: Convergence<T>,
    /// Sweeps between convergence checks.
    pub check_interval: usize,
}

impl<T: Real> GaussSeidel<T> {
    pub fn new(tol: T, max_iters: usize) -> Self {
        GaussSeidel { conv: Convergence { tol, max_iters }, check_interval: 1 }
    }

    pub fn with_check_interval(mut self, k: usize) -> Self {
        self.check_interval = k.max(1);
        self
    }
}

fn row_product<T: Real, A: InfluenceOperator<T> + ?Sized>(a: &A, i: usize, x: &[T]) -> T {
    (0..x.len()).into_par_iter().map(|j| a.entry(i, j) * x[j]).sum()
}

impl<T: Real> LinearSolver<T> for GaussSeidel<T> {
    fn name(&self) -> &'static str {
        "gauss-seidel"
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
        let diag = checked_diagonal(a)?;
        let comm = monitor.comm();
        let rows = comm.partition(n);
        let counts = comm.counts(n);
        let b_norm = ResidualNorm::Max.measure(b);

        let mut rel = T::infinity();
        let mut status = SolveStatus::MaxIterationsReached;
        let mut sweep = start;
        while sweep < self.conv.max_iters {
            sweep += 1;
            let mut local_max = T::zero();
            for i in rows.clone() {
                let ri = b[i] - row_product(a, i, x);
                x[i] += ri / diag[i];
                local_max = local_max.max(ri.abs());
            }
            if comm.size() > 1 {
                let send: Vec<f64> = x[rows.clone()].iter().map(|v| v.to_f64_lossy()).collect();
                let all = comm.all_gather_varcount(&send, &counts);
                x.iter_mut().zip(all).for_each(|(xi, v)| *xi = T::from_f64_lossy(v));
                local_max = T::from_f64_lossy(comm.all_reduce_max(local_max.to_f64_lossy()));
            }
            rel = self.conv.relative(local_max, b_norm);
            if let ControlFlow::Break(s) = monitor.record(sweep, rel, x) {
                status = s;
                break;
            }
            if sweep % self.check_interval == 0 && rel <= self.conv.tol {
                let r = residual(a, comm, b, x);
                rel = self.conv.relative(ResidualNorm::Max.measure(&r), b_norm);
                if rel <= self.conv.tol {
                    status = SolveStatus::Converged;
                    break;
                }
            }
        }
        if status != SolveStatus::Converged {
            let r = residual(a, comm, b, x);
            rel = self.conv.relative(ResidualNorm::Max.measure(&r), b_norm);
        }
        Ok(monitor.finish(SolveStats::new(sweep, rel, status), x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::thread_comm::ThreadComm;
    use crate::solver::testing::{dominant_system, run, run_on};
    use approx::assert_abs_diff_eq;

    #[test]
    fn converges_on_dominant_system() {
        let (a, b, x_true) = dominant_system(12, 7);
        let (x, stats) = run(&mut GaussSeidel::new(1e-10, 200), &a, &b);
        assert!(stats.converged, "{stats:?}");
        for (xi, ei) in x.iter().zip(&x_true) {
            assert_abs_diff_eq!(*xi, *ei, epsilon = 1e-8);
        }
        assert_eq!(stats.residual_history.len(), stats.iterations);
    }

    #[test]
    fn iteration_cap_is_reported() {
        let (a, b, _) = dominant_system(12, 8);
        let (_, stats) = run(&mut GaussSeidel::new(1e-14, 2), &a, &b);
        assert!(!stats.converged);
        assert_eq!(stats.status, SolveStatus::MaxIterationsReached);
        assert_eq!(stats.iterations, 2);
    }

    #[test]
    fn block_sweeps_over_ranks_reach_the_same_solution() {
        let (a, b, x_true) = dominant_system(13, 9);
        let (serial, _) = run(&mut GaussSeidel::new(1e-11, 500), &a, &b);
        let results = ThreadComm::run(3, |c| run_on(c, &mut GaussSeidel::new(1e-11, 500), &a, &b));
        let first = results[0].0.clone();
        for (x, stats) in results {
            assert!(stats.converged, "{stats:?}");
            assert_eq!(x, first, "ranks disagree on the iterate");
            for ((xi, si), ei) in x.iter().zip(&serial).zip(&x_true) {
                assert_abs_diff_eq!(*xi, *si, epsilon = 1e-9);
                assert_abs_diff_eq!(*xi, *ei, epsilon = 1e-9);
            }
        }
    }
}
