// Compressed sparse row storage for near-field interactions, backed by faer.

use crate::error::BemError;
use faer::sparse::{SparseRowMat, Triplet};
use rayon::prelude::*;

pub struct CsrMatrix {
    inner: SparseRowMat<usize, f64>,
}

impl CsrMatrix {
    /// Assembles from `(row, col, value)` triplets; duplicates are summed.
    pub fn from_triplets(nrows: usize, ncols: usize, entries: &[Triplet<usize, usize, f64>]) -> Result<Self, BemError> {
        let inner = SparseRowMat::try_new_from_triplets(nrows, ncols, entries)?;
        Ok(CsrMatrix { inner })
    }

    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    pub fn nnz(&self) -> usize {
        self.inner.val().len()
    }

    pub fn as_faer(&self) -> &SparseRowMat<usize, f64> {
        &self.inner
    }

    /// Parallel SpMV using Rayon, one task per row.
    pub fn spmv_parallel(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.ncols());
        assert_eq!(y.len(), self.nrows());
        let symbolic = self.inner.symbolic();
        let (cols, vals) = (symbolic.col_idx(), self.inner.val());
        y.par_iter_mut().enumerate().for_each(|(i, yi)| {
            let range = symbolic.row_range(i);
            *yi = cols[range.clone()].iter().zip(&vals[range]).map(|(&j, v)| v * x[j]).sum();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn simple_pattern() {
        // 2×3 matrix [[1,2,0],[0,3,4]], with the (1,2) entry split in two
        let entries = [
            Triplet::new(1, 2, 1.5),
            Triplet::new(0, 0, 1.0),
            Triplet::new(1, 1, 3.0),
            Triplet::new(0, 1, 2.0),
            Triplet::new(1, 2, 2.5),
        ];
        let m = CsrMatrix::from_triplets(2, 3, &entries).unwrap();
        assert_eq!(m.nnz(), 4);
        let mut y = vec![0.0; 2];
        m.spmv_parallel(&[1.0, 1.0, 1.0], &mut y);
        assert_eq!(y, vec![3.0, 7.0]);
    }

    #[test]
    fn out_of_range_triplets_are_rejected() {
        let entries = [Triplet::new(0, 3, 1.0)];
        assert!(matches!(CsrMatrix::from_triplets(2, 3, &entries), Err(BemError::Sparse(_))));
    }

    #[test]
    fn parallel_spmv_matches_faer_dense_product() {
        let mut rng = StdRng::seed_from_u64(7);
        let (nrows, ncols) = (40, 30);
        let entries: Vec<_> = (0..200)
            .map(|_| Triplet::new(rng.gen_range(0..nrows), rng.gen_range(0..ncols), rng.gen_range(-1.0..1.0)))
            .collect();
        let m = CsrMatrix::from_triplets(nrows, ncols, &entries).unwrap();
        let x: Vec<f64> = (0..ncols).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let mut y = vec![0.0; nrows];
        m.spmv_parallel(&x, &mut y);

        let dense = m.as_faer().to_dense();
        let xm = faer::Mat::<f64>::from_fn(ncols, 1, |i, _| x[i]);
        let expected = &dense * &xm;
        for i in 0..nrows {
            assert_relative_eq!(y[i], expected[(i, 0)], epsilon = 1e-12);
        }
    }
}
