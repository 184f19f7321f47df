//! Robin Hood: greedy single-element residual correction.
//!
//! Every iteration picks the row with the largest residual magnitude (lowest
//! index on ties), adjusts its unknown so that row is satisfied exactly, and
//! updates the residual with one column of the operator. Only one column is
//! evaluated per iteration, so the full matrix is never needed.
//!
//! The residual is maintained incrementally. Every `check_interval`
//! iterations it is measured; when it looks converged it is recomputed from
//! scratch and the solve only stops if the fresh residual agrees.
//!
//! With a cluster communicator each rank owns a block of residual rows. The
//! pivot is reduced across ranks, the unknown vector stays replicated.

use super::{LinearSolver, SolveMonitor, check_lengths, checked_diagonal, residual, zero_rhs};
use crate::core::traits::{InfluenceOperator, Real};
use crate::error::BemError;
use crate::utils::convergence::{Convergence, ResidualNorm, SolveStats, SolveStatus};
use log::debug;
use std::ops::ControlFlow;

pub struct RobinHood<T> {
    pub conv: Convergence<T>,
    pub check_interval: usize,
}

impl<T: Real> RobinHood<T> {
    pub fn new(tol: T, max_iters: usize, check_interval: usize) -> Self {
        RobinHood { conv: Convergence { tol, max_iters }, check_interval: check_interval.max(1) }
    }
}

/// Largest |r| in `r` with its offset; first occurrence wins.
pub(crate) fn argmax_abs<T: Real>(r: &[T]) -> (T, usize) {
    r.iter().enumerate().fold((T::zero(), 0), |(best, k), (i, v)| {
        if v.abs() > best { (v.abs(), i) } else { (best, k) }
    })
}

impl<T: Real> LinearSolver<T> for RobinHood<T> {
    fn name(&self) -> &'static str {
        "robin-hood"
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
        let b_norm = ResidualNorm::Max.measure(b);

        // local block of the residual
        let mut r = residual(a, comm, b, x)[rows.clone()].to_vec();
        let mut column = vec![T::zero(); rows.len()];
        let global_max = |r: &[T]| -> (T, usize) {
            let (v, k) = argmax_abs(r);
            let k = if r.is_empty() { usize::MAX } else { rows.start + k };
            if comm.size() == 1 {
                return (v, k);
            }
            let (v, k) = comm.all_reduce_max_loc(v.to_f64_lossy(), k);
            (T::from_f64_lossy(v), k)
        };

        let mut rel = self.conv.relative(global_max(&r).0, b_norm);
        let mut status = SolveStatus::MaxIterationsReached;
        let mut it = start;
        if rel <= self.conv.tol {
            status = SolveStatus::Converged;
        }
        while status != SolveStatus::Converged && it < self.conv.max_iters {
            it += 1;
            let (_, k) = global_max(&r);
            // signed residual of the pivot row, owned by one rank
            let rk = if rows.contains(&k) { r[k - rows.start] } else { T::zero() };
            let rk = if comm.size() == 1 { rk } else { T::from_f64_lossy(comm.all_reduce_sum(rk.to_f64_lossy())) };
            let delta = rk / diag[k];
            x[k] += delta;
            a.column_into(k, rows.clone(), &mut column);
            r.iter_mut().zip(&column).for_each(|(ri, &c)| *ri -= c * delta);

            if it % self.check_interval == 0 || it == self.conv.max_iters {
                rel = self.conv.relative(global_max(&r).0, b_norm);
                if let ControlFlow::Break(s) = monitor.record(it, rel, x) {
                    status = s;
                    break;
                }
                if rel <= self.conv.tol {
                    let fresh = residual(a, comm, b, x);
                    r.copy_from_slice(&fresh[rows.clone()]);
                    rel = self.conv.relative(ResidualNorm::Max.measure(&fresh), b_norm);
                    if rel <= self.conv.tol {
                        status = SolveStatus::Converged;
                    } else {
                        debug!("incremental residual drifted; continuing at relative residual {rel}");
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
    use crate::parallel::thread_comm::ThreadComm;
    use crate::solver::testing::{dominant_system, run, run_on};
    use approx::assert_abs_diff_eq;
    use faer::Mat;

    #[test]
    fn ties_break_to_lowest_index() {
        assert_eq!(argmax_abs(&[1.0, -3.0, 3.0, 2.0]), (3.0, 1));
    }

    #[test]
    fn converges_on_dominant_system() {
        let (a, b, x_true) = dominant_system(10, 3);
        let (x, stats) = run(&mut RobinHood::new(1e-10, 5000, 10), &a, &b);
        assert!(stats.converged, "{stats:?}");
        for (xi, ei) in x.iter().zip(&x_true) {
            assert_abs_diff_eq!(*xi, *ei, epsilon = 1e-8);
        }
    }

    #[test]
    fn one_update_per_iteration() {
        let (a, b, _) = dominant_system(6, 4);
        let (x, stats) = run(&mut RobinHood::new(1e-12, 1, 1), &a, &b);
        assert_eq!(stats.iterations, 1);
        assert_eq!(x.iter().filter(|&&v| v != 0.0).count(), 1);
    }

    #[test]
    fn pivot_ties_across_ranks_pick_the_lowest_row() {
        // every row has the same residual; rows 0..2, 2..4 and 4..6 live on different ranks
        let a = Mat::from_fn(6, 6, |i, j| if i == j { 2.0 } else { 0.0 });
        let b = vec![1.0; 6];
        let results = ThreadComm::run(3, |c| run_on(c, &mut RobinHood::new(1e-12, 1, 1), &a, &b).0);
        for x in results {
            assert_eq!(x, vec![0.5, 0.0, 0.0, 0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn ranks_follow_the_single_process_iterates() {
        let (a, b, _) = dominant_system(11, 5);
        let (serial, serial_stats) = run(&mut RobinHood::new(1e-10, 5000, 10), &a, &b);
        let results = ThreadComm::run(3, |c| run_on(c, &mut RobinHood::new(1e-10, 5000, 10), &a, &b));
        assert!(serial_stats.converged);
        let first = results[0].0.clone();
        for (x, stats) in results {
            assert!(stats.converged, "{stats:?}");
            assert_eq!(x, first, "ranks disagree on the iterate");
            for (xi, si) in x.iter().zip(&serial) {
                assert_abs_diff_eq!(*xi, *si, epsilon = 1e-8);
            }
        }
    }
}
