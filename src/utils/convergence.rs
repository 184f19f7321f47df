//! Convergence tracking & tolerance checks for iterative solvers.

use num_traits::Float;

/// Which norm a solver measures its residual in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResidualNorm {
    /// ‖r‖₂ relative to ‖b‖₂ (direct and Krylov solvers).
    Euclidean,
    /// ‖r‖∞ relative to ‖b‖∞ (relaxation and greedy correction solvers).
    Max,
}

impl ResidualNorm {
    pub fn measure<T: Float>(self, v: &[T]) -> T {
        match self {
            ResidualNorm::Euclidean => v.iter().fold(T::zero(), |acc, &x| acc + x * x).sqrt(),
            ResidualNorm::Max => v.iter().fold(T::zero(), |acc, &x| acc.max(x.abs())),
        }
    }
}

/// Stopping criteria & stats.
#[derive(Clone, Copy, Debug)]
pub struct Convergence<T> {
    pub tol: T,
    pub max_iters: usize,
}

/// How a solve ended. Only `Converged` means the tolerance was met.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    Converged,
    MaxIterationsReached,
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct SolveStats<T> {
    pub iterations: usize,
    pub final_residual: T,
    pub converged: bool,
    pub status: SolveStatus,
    /// Relative residual at every recorded iteration boundary.
    pub residual_history: Vec<T>,
    /// Iteration the solve was resumed from, if a checkpoint was loaded.
    pub resumed_from: Option<usize>,
    /// Number of observer callbacks that returned an error.
    pub listener_errors: usize,
}

impl<T: Float> SolveStats<T> {
    pub fn new(iterations: usize, final_residual: T, status: SolveStatus) -> Self {
        SolveStats {
            iterations,
            final_residual,
            converged: status == SolveStatus::Converged,
            status,
            residual_history: Vec::new(),
            resumed_from: None,
            listener_errors: 0,
        }
    }
}

impl<T: Float> Convergence<T> {
    /// Relative residual, guarding against a zero reference norm.
    pub fn relative(&self, res_norm: T, ref_norm: T) -> T {
        if ref_norm > T::zero() {
            res_norm / ref_norm
        } else {
            res_norm
        }
    }

    /// Returns true once `res_norm` relative to `ref_norm` is within tolerance.
    pub fn is_converged(&self, res_norm: T, ref_norm: T) -> bool {
        self.relative(res_norm, ref_norm) <= self.tol
    }

    /// Returns (should_stop, status) given current `res_norm` and iteration `i`.
    pub fn check(&self, res_norm: T, ref_norm: T, i: usize) -> (bool, SolveStatus) {
        if self.is_converged(res_norm, ref_norm) {
            (true, SolveStatus::Converged)
        } else if i >= self.max_iters {
            (true, SolveStatus::MaxIterationsReached)
        } else {
            (false, SolveStatus::MaxIterationsReached)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_is_not_convergence() {
        let conv = Convergence { tol: 1e-8, max_iters: 10 };
        let (stop, status) = conv.check(1.0, 1.0, 10);
        assert!(stop);
        assert_eq!(status, SolveStatus::MaxIterationsReached);
        let (stop, status) = conv.check(1e-9, 1.0, 3);
        assert!(stop);
        assert_eq!(status, SolveStatus::Converged);
        assert!(!conv.check(1e-3, 1.0, 3).0);
    }

    #[test]
    fn norms() {
        let v = [3.0_f64, -4.0];
        assert_eq!(ResidualNorm::Euclidean.measure(&v), 5.0);
        assert_eq!(ResidualNorm::Max.measure(&v), 4.0);
    }
}
