//! BiCGStab solver (Saad §7.1) with optional right preconditioning.
//!
//! With a preconditioner M the iteration runs on A·M⁻¹ and the iterate is
//! updated with preconditioned directions, so the tracked residual is the
//! true residual of A·x = b. A breakdown (vanishing ρ or ⟨r̂, v⟩) restarts
//! the recurrence from the current true residual; a breakdown right after a
//! restart is reported as an error.

use super::{LinearSolver, SolveMonitor, apply, check_lengths, residual, zero_rhs};
use crate::core::traits::{InfluenceOperator, InnerProduct, Real};
use crate::error::BemError;
use crate::preconditioner::Preconditioner;
use crate::utils::convergence::{Convergence, ResidualNorm, SolveStats, SolveStatus};
use log::debug;
use std::ops::ControlFlow;

pub struct BiCgStabSolver<'p, T> {
    pub conv: Convergence<T>,
    pc: Option<&'p dyn Preconditioner<T>>,
}

impl<'p, T: Real> BiCgStabSolver<'p, T> {
    pub fn new(tol: T, max_iters: usize) -> Self {
        Self { conv: Convergence { tol, max_iters }, pc: None }
    }

    pub fn with_preconditioner(mut self, pc: &'p dyn Preconditioner<T>) -> Self {
        self.pc = Some(pc);
        self
    }

    fn precondition(&self, v: &[T], out: &mut [T]) -> Result<(), BemError> {
        match self.pc {
            Some(pc) => pc.apply(v, out),
            None => {
                out.copy_from_slice(v);
                Ok(())
            }
        }
    }
}

fn tiny<T: Real>(value: T, scale: T) -> bool {
    value.abs() <= T::epsilon() * scale
}

impl<T: Real> LinearSolver<T> for BiCgStabSolver<'_, T> {
    fn name(&self) -> &'static str {
        "bicgstab"
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
        let start = monitor.initialize(self.name(), x);
        if let Some(stats) = zero_rhs(ResidualNorm::Euclidean, b, x, monitor) {
            return Ok(stats);
        }
        let comm = monitor.comm();
        let ip = ();
        let b_norm = ip.norm(b);

        let mut r = residual(a, comm, b, x);
        let mut r_hat = r.clone(); // shadow residual
        let mut p = vec![T::zero(); n];
        let mut v = vec![T::zero(); n];
        let mut p_hat = vec![T::zero(); n];
        let mut s_hat = vec![T::zero(); n];
        let mut t = vec![T::zero(); n];
        let (mut rho_prev, mut alpha, mut omega) = (T::one(), T::one(), T::one());
        let mut just_restarted = true;

        let mut rel = self.conv.relative(ip.norm(&r[..]), b_norm);
        let mut status = if rel <= self.conv.tol { SolveStatus::Converged } else { SolveStatus::MaxIterationsReached };
        let mut it = start;
        while status != SolveStatus::Converged && it < self.conv.max_iters {
            it += 1;
            let rho = ip.dot(&r_hat[..], &r[..]);
            if tiny(rho, ip.norm(&r_hat[..]) * ip.norm(&r[..])) {
                if just_restarted {
                    return Err(BemError::Breakdown { solver: "bicgstab", reason: format!("rho vanished at iteration {it}") });
                }
                debug!("bicgstab: rho breakdown at iteration {it}, restarting");
                r = residual(a, comm, b, x);
                r_hat.copy_from_slice(&r);
                p.iter_mut().chain(v.iter_mut()).for_each(|z| *z = T::zero());
                (rho_prev, alpha, omega) = (T::one(), T::one(), T::one());
                just_restarted = true;
                continue;
            }
            let beta = (rho / rho_prev) * (alpha / omega);
            // p = r + beta * (p - omega * v)
            for ((pj, &rj), &vj) in p.iter_mut().zip(&r).zip(&v) {
                *pj = rj + beta * (*pj - omega * vj);
            }
            self.precondition(&p, &mut p_hat)?;
            apply(a, comm, &p_hat, &mut v);
            let denom = ip.dot(&r_hat[..], &v[..]);
            if tiny(denom, ip.norm(&r_hat[..]) * ip.norm(&v[..])) {
                if just_restarted {
                    return Err(BemError::Breakdown { solver: "bicgstab", reason: format!("<r_hat, v> vanished at iteration {it}") });
                }
                r = residual(a, comm, b, x);
                r_hat.copy_from_slice(&r);
                p.iter_mut().chain(v.iter_mut()).for_each(|z| *z = T::zero());
                (rho_prev, alpha, omega) = (T::one(), T::one(), T::one());
                just_restarted = true;
                continue;
            }
            alpha = rho / denom;
            // s = r - alpha * v, kept in r
            r.iter_mut().zip(&v).for_each(|(rj, &vj)| *rj -= alpha * vj);
            let s_rel = self.conv.relative(ip.norm(&r[..]), b_norm);
            if s_rel <= self.conv.tol {
                x.iter_mut().zip(&p_hat).for_each(|(xj, &pj)| *xj += alpha * pj);
                rel = s_rel;
                status = SolveStatus::Converged;
                let _ = monitor.record(it, rel, x);
                break;
            }
            self.precondition(&r, &mut s_hat)?;
            apply(a, comm, &s_hat, &mut t);
            let tt = ip.dot(&t[..], &t[..]);
            omega = if tt > T::zero() { ip.dot(&t[..], &r[..]) / tt } else { T::zero() };
            // x = x + alpha * p_hat + omega * s_hat
            for ((xj, &pj), &sj) in x.iter_mut().zip(&p_hat).zip(&s_hat) {
                *xj += alpha * pj + omega * sj;
            }
            r.iter_mut().zip(&t).for_each(|(rj, &tj)| *rj -= omega * tj);
            rel = self.conv.relative(ip.norm(&r[..]), b_norm);
            rho_prev = rho;
            just_restarted = false;

            if let ControlFlow::Break(s) = monitor.record(it, rel, x) {
                status = s;
                break;
            }
            if rel <= self.conv.tol {
                status = SolveStatus::Converged;
            } else if omega == T::zero() {
                // stagnation: restart from the true residual
                r = residual(a, comm, b, x);
                r_hat.copy_from_slice(&r);
                p.iter_mut().chain(v.iter_mut()).for_each(|z| *z = T::zero());
                (rho_prev, alpha, omega) = (T::one(), T::one(), T::one());
                just_restarted = true;
            }
        }
        Ok(monitor.finish(SolveStats::new(it, rel, status), x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preconditioner::Jacobi;
    use crate::solver::testing::{dominant_system, run};
    use approx::assert_abs_diff_eq;

    #[test]
    fn bicgstab_solves_well_conditioned_nonsym() {
        let (a, b, x_true) = dominant_system(20, 5);
        let (x, stats) = run(&mut BiCgStabSolver::new(1e-10, 100), &a, &b);
        assert!(stats.converged, "BiCGStab did not converge: stats = {:?}", stats);
        for (xi, ei) in x.iter().zip(&x_true) {
            assert_abs_diff_eq!(*xi, *ei, epsilon = 1e-8);
        }
    }

    #[test]
    fn jacobi_preconditioning_keeps_true_residual() {
        let (a, b, x_true) = dominant_system(20, 6);
        let pc = Jacobi::from_operator(&a).unwrap();
        let (x, stats) = run(&mut BiCgStabSolver::new(1e-10, 100).with_preconditioner(&pc), &a, &b);
        assert!(stats.converged);
        let r = crate::core::residual(&a, &b, &x);
        assert!(().norm(&r[..]) / ().norm(&b[..]) < 1e-9);
        assert_abs_diff_eq!(x[3], x_true[3], epsilon = 1e-8);
    }
}
