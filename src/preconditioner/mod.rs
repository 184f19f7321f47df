//! Preconditioners for the Krylov solvers.

use crate::error::BemError;

/// A preconditioner M ≈ A⁻¹.
pub trait Preconditioner<T> {
    /// Apply M⁻¹ to r, writing z = M⁻¹ r
    fn apply(&self, r: &[T], z: &mut [T]) -> Result<(), BemError>;
}

pub mod jacobi;

pub use jacobi::Jacobi;
