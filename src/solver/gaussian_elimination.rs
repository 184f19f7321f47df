//! Direct dense solve with Faer's fully pivoted LU.
//!
//! The operator is materialized in `f64` regardless of the solve precision;
//! the solution is rounded to `T` afterwards and the residual measured in
//! `T`. Suitable for small to medium systems.

use super::{LinearSolver, SolveMonitor, check_lengths, residual, zero_rhs};
use crate::core::traits::{InfluenceOperator, Real};
use crate::error::BemError;
use crate::matrix::materialize;
use crate::utils::convergence::{Convergence, ResidualNorm, SolveStats};
use faer::linalg::solvers::{FullPivLu, SolveCore};
use faer::{Conj, MatMut};
use log::debug;

pub struct GaussianElimination<T> {
    pub conv: Convergence<T>,
}

impl<T: Real> GaussianElimination<T> {
    pub fn new(tol: T) -> Self {
        GaussianElimination { conv: Convergence { tol, max_iters: 1 } }
    }
}

impl<T: Real> LinearSolver<T> for GaussianElimination<T> {
    fn name(&self) -> &'static str {
        "gaussian-elimination"
    }

    fn residual_norm(&self) -> ResidualNorm {
        ResidualNorm::Euclidean
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
        monitor.initialize(self.name(), x);
        if let Some(stats) = zero_rhs(ResidualNorm::Euclidean, b, x, monitor) {
            return Ok(stats);
        }

        let mat = materialize(a);
        debug!("factorizing {n}x{n} influence matrix");
        let lu = FullPivLu::new(mat.as_ref());
        let mut sol: Vec<f64> = b.iter().map(|v| v.to_f64_lossy()).collect();
        lu.solve_in_place_with_conj(Conj::No, MatMut::from_column_major_slice_mut(&mut sol, n, 1));
        if let Some(i) = sol.iter().position(|v| !v.is_finite()) {
            return Err(BemError::Breakdown {
                solver: "gaussian-elimination",
                reason: format!("singular matrix (non-finite solution component {i})"),
            });
        }
        for (xi, s) in x.iter_mut().zip(&sol) {
            *xi = T::from_f64_lossy(*s);
        }

        let r = residual(a, monitor.comm(), b, x);
        let rel = self.conv.relative(ResidualNorm::Euclidean.measure(&r), ResidualNorm::Euclidean.measure(b));
        let _ = monitor.record(1, rel, x);
        let (_, status) = self.conv.check(rel, T::one(), 1);
        Ok(monitor.finish(SolveStats::new(1, rel, status), x))
    }
}
