//! Restarted GMRES (Saad §6.4) with optional right preconditioning.
//!
//! The Arnoldi basis is built for A·M⁻¹ with two modified Gram-Schmidt
//! passes; Givens rotations keep the least-squares residual available at
//! every inner step. After each cycle the iterate is updated with M⁻¹·V·y and
//! the true residual is recomputed, so a restart never carries rounding drift
//! from the previous cycle.

use super::{LinearSolver, SolveMonitor, apply, check_lengths, residual, zero_rhs};
use crate::core::traits::{InfluenceOperator, InnerProduct, Real};
use crate::error::BemError;
use crate::preconditioner::Preconditioner;
use crate::utils::convergence::{Convergence, ResidualNorm, SolveStats, SolveStatus};
use log::debug;
use std::ops::ControlFlow;

pub struct GmresSolver<'p, T> {
    /// Number of Arnoldi vectors before restart
    pub restart: usize,
    pub conv: Convergence<T>,
    pc: Option<&'p dyn Preconditioner<T>>,
}

impl<'p, T: Real> GmresSolver<'p, T> {
    pub fn new(restart: usize, tol: T, max_iters: usize) -> Self {
        Self { restart: restart.max(1), conv: Convergence { tol, max_iters }, pc: None }
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

    /// Rotate column `j` of the Hessenberg matrix and the right-hand side `g`.
    fn apply_givens(h: &mut [Vec<T>], g: &mut [T], cs: &mut [T], sn: &mut [T], j: usize) {
        for i in 0..j {
            let temp = cs[i] * h[i][j] + sn[i] * h[i + 1][j];
            h[i + 1][j] = -sn[i] * h[i][j] + cs[i] * h[i + 1][j];
            h[i][j] = temp;
        }
        let (h_kk, h_k1k) = (h[j][j], h[j + 1][j]);
        let r = h_kk.hypot(h_k1k);
        if r == T::zero() {
            cs[j] = T::one();
            sn[j] = T::zero();
        } else {
            cs[j] = h_kk / r;
            sn[j] = h_k1k / r;
        }
        h[j][j] = cs[j] * h_kk + sn[j] * h_k1k;
        h[j + 1][j] = T::zero();
        let temp = cs[j] * g[j] + sn[j] * g[j + 1];
        g[j + 1] = -sn[j] * g[j] + cs[j] * g[j + 1];
        g[j] = temp;
    }

    /// Solve the upper-triangular m×m system H·y = g.
    fn back_substitution(h: &[Vec<T>], g: &[T], m: usize) -> Result<Vec<T>, BemError> {
        let mut y = vec![T::zero(); m];
        for i in (0..m).rev() {
            let mut acc = g[i];
            for j in (i + 1)..m {
                acc -= h[i][j] * y[j];
            }
            if h[i][i] == T::zero() {
                return Err(BemError::Breakdown { solver: "gmres", reason: format!("singular Hessenberg at column {i}") });
            }
            y[i] = acc / h[i][i];
        }
        Ok(y)
    }
}

impl<T: Real> LinearSolver<T> for GmresSolver<'_, T> {
    fn name(&self) -> &'static str {
        "gmres"
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
        let m_max = self.restart.min(n);
        let happy = T::epsilon() * b_norm;

        let mut r = residual(a, comm, b, x);
        let mut beta = ip.norm(&r[..]);
        let mut rel = self.conv.relative(beta, b_norm);
        let mut status = if rel <= self.conv.tol { SolveStatus::Converged } else { SolveStatus::MaxIterationsReached };
        let mut it = start;
        let mut w = vec![T::zero(); n];
        let mut z = vec![T::zero(); n];

        'outer: while status != SolveStatus::Converged && it < self.conv.max_iters {
            let mut v_basis: Vec<Vec<T>> = Vec::with_capacity(m_max + 1);
            v_basis.push(r.iter().map(|&ri| ri / beta).collect());
            let mut h = vec![vec![T::zero(); m_max]; m_max + 1];
            let mut g = vec![T::zero(); m_max + 1];
            g[0] = beta;
            let mut cs = vec![T::zero(); m_max];
            let mut sn = vec![T::zero(); m_max];
            let mut m = 0;
            let mut cancelled = None;

            for j in 0..m_max {
                if it >= self.conv.max_iters {
                    break;
                }
                it += 1;
                self.precondition(&v_basis[j], &mut z)?;
                apply(a, comm, &z, &mut w);
                // two passes of modified Gram-Schmidt
                for _ in 0..2 {
                    for (i, vi) in v_basis.iter().enumerate() {
                        let hij = ip.dot(&w[..], &vi[..]);
                        h[i][j] += hij;
                        w.iter_mut().zip(vi).for_each(|(wk, &vk)| *wk -= hij * vk);
                    }
                }
                h[j + 1][j] = ip.norm(&w[..]);
                let breakdown = h[j + 1][j] <= happy;
                if !breakdown {
                    let inv = T::one() / h[j + 1][j];
                    v_basis.push(w.iter().map(|&wk| wk * inv).collect());
                }
                Self::apply_givens(&mut h, &mut g, &mut cs, &mut sn, j);
                m = j + 1;
                rel = self.conv.relative(g[j + 1].abs(), b_norm);
                if let ControlFlow::Break(s) = monitor.record(it, rel, x) {
                    cancelled = Some(s);
                    break;
                }
                if rel <= self.conv.tol || breakdown {
                    if breakdown {
                        debug!("gmres: invariant subspace found at iteration {it}");
                    }
                    break;
                }
            }

            if m > 0 {
                let y = Self::back_substitution(&h, &g, m)?;
                // x += M⁻¹ (V y)
                let mut vy = vec![T::zero(); n];
                for (yj, vj) in y.iter().zip(&v_basis) {
                    vy.iter_mut().zip(vj).for_each(|(acc, &v)| *acc += *yj * v);
                }
                self.precondition(&vy, &mut z)?;
                x.iter_mut().zip(&z).for_each(|(xi, &zi)| *xi += zi);
            }
            if let Some(s) = cancelled {
                status = s;
                break 'outer;
            }

            r = residual(a, comm, b, x);
            beta = ip.norm(&r[..]);
            rel = self.conv.relative(beta, b_norm);
            if rel <= self.conv.tol {
                status = SolveStatus::Converged;
            } else if beta == T::zero() || m == 0 {
                break;
            }
        }
        Ok(monitor.finish(SolveStats::new(it, rel, status), x))
    }
}
