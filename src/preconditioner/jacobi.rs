// Jacobi preconditioner implementation

use crate::core::traits::{InfluenceOperator, Real};
use crate::error::BemError;
use crate::preconditioner::Preconditioner;

/// Jacobi preconditioner: M⁻¹ = D⁻¹
pub struct Jacobi<T> {
    pub(crate) inv_diag: Vec<T>,
}

impl<T: Real> Jacobi<T> {
    /// Reads the diagonal of `a`. A zero diagonal entry is an error.
    pub fn from_operator<A: InfluenceOperator<T> + ?Sized>(a: &A) -> Result<Self, BemError> {
        let inv_diag = (0..a.dimension())
            .map(|i| {
                let d = a.diagonal(i);
                if d == T::zero() {
                    Err(BemError::ZeroPivot(i))
                } else {
                    Ok(T::one() / d)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Jacobi { inv_diag })
    }
}

impl<T: Real> Preconditioner<T> for Jacobi<T> {
    fn apply(&self, x: &[T], y: &mut [T]) -> Result<(), BemError> {
        if x.len() != self.inv_diag.len() || y.len() != x.len() {
            return Err(BemError::InvalidConfig(format!(
                "preconditioner of size {} applied to vectors of length {} and {}",
                self.inv_diag.len(),
                x.len(),
                y.len()
            )));
        }
        for ((yi, &xi), &d) in y.iter_mut().zip(x).zip(&self.inv_diag) {
            *yi = d * xi;
        }
        Ok(())
    }
}
