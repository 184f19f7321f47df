use crate::core::traits::{InfluenceOperator, Real};
use crate::parallel::Comm;
use std::ops::Range;

/// Row-partitioned view of an operator across the ranks of a communicator.
///
/// Each rank evaluates only its own block of rows; the blocks are then
/// all-gathered so every rank ends up with the full product.
pub struct PartitionedOperator<'a, A: ?Sized> {
    inner: &'a A,
    comm: &'a dyn Comm,
    rows: Range<usize>,
    counts: Vec<usize>,
}

impl<'a, A: ?Sized> PartitionedOperator<'a, A> {
    pub fn new<T: Real>(inner: &'a A, comm: &'a dyn Comm) -> Self
    where
        A: InfluenceOperator<T>,
    {
        let n = inner.dimension();
        PartitionedOperator { inner, comm, rows: comm.partition(n), counts: comm.counts(n) }
    }

    pub fn local_rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    /// `y = A·x` on every rank.
    pub fn apply<T: Real>(&self, x: &[T], y: &mut [T])
    where
        A: InfluenceOperator<T>,
    {
        if self.comm.size() == 1 {
            self.inner.matvec(x, y);
            return;
        }
        let mut local = vec![T::zero(); self.rows.len()];
        self.inner.matvec_rows(self.local_rows(), x, &mut local);
        let send: Vec<f64> = local.iter().map(|v| v.to_f64_lossy()).collect();
        let all = self.comm.all_gather_varcount(&send, &self.counts);
        for (yi, v) in y.iter_mut().zip(all) {
            *yi = T::from_f64_lossy(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::LocalComm;
    use crate::parallel::thread_comm::ThreadComm;
    use approx::assert_relative_eq;
    use faer::Mat;

    #[test]
    fn single_rank_apply_is_plain_product() {
        let a = Mat::from_fn(3, 3, |i, j| (i + j) as f64);
        let comm = LocalComm::new();
        let p = PartitionedOperator::new::<f64>(&a, &comm);
        assert_eq!(p.local_rows(), 0..3);
        let mut y = vec![0.0; 3];
        p.apply(&[1.0, 1.0, 1.0], &mut y);
        assert_eq!(y, vec![3.0, 6.0, 9.0]);
    }

    #[test]
    fn row_blocks_gather_to_the_serial_product() {
        let a = Mat::from_fn(7, 7, |i, j| 1.0 / (1.0 + i as f64 + 2.0 * j as f64));
        let x: Vec<f64> = (0..7).map(|i| (i as f64 * 0.7).cos()).collect();
        let mut serial = vec![0.0; 7];
        PartitionedOperator::new::<f64>(&a, &LocalComm::new()).apply(&x, &mut serial);

        let results = ThreadComm::run(3, |c| {
            let p = PartitionedOperator::new::<f64>(&a, c);
            let mut y = vec![0.0; 7];
            p.apply(&x, &mut y);
            (p.local_rows(), y)
        });
        let blocks: Vec<_> = results.iter().map(|(rows, _)| rows.clone()).collect();
        assert_eq!(blocks, vec![0..3, 3..5, 5..7]);
        for (_, y) in results {
            for (yi, si) in y.iter().zip(&serial) {
                assert_relative_eq!(*yi, *si, max_relative = 1e-12);
            }
        }
    }
}
