//! Process-level communication for the cluster layer.
//!
//! Every solver talks to its peers through [`Comm`]. Data crosses process
//! boundaries as `f64` regardless of the precision of the solve. The
//! single-process [`LocalComm`] turns every collective into a copy, so the
//! same solver code runs unchanged with and without MPI.

pub mod local_comm;
#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(test)]
pub(crate) mod thread_comm;

pub use local_comm::LocalComm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

use crate::config::AcceleratorBackend;
use crate::error::BemError;
use std::ops::Range;

pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);

    fn all_reduce_sum(&self, x: f64) -> f64;
    fn all_reduce_max(&self, x: f64) -> f64;

    /// Concatenates every rank's `local` in rank order; `counts[r]` is the
    /// length contributed by rank `r`.
    fn all_gather_varcount(&self, local: &[f64], counts: &[usize]) -> Vec<f64>;

    /// Overwrites `data` on every rank with the contents held by `root`.
    fn broadcast(&self, data: &mut [f64], root: usize);

    /// Contiguous block of `0..n` owned by this rank.
    fn partition(&self, n: usize) -> Range<usize> {
        block_range(n, self.size(), self.rank())
    }

    /// Block lengths of `0..n` for all ranks.
    fn counts(&self, n: usize) -> Vec<usize> {
        (0..self.size()).map(|r| block_range(n, self.size(), r).len()).collect()
    }

    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    /// Global maximum of `value` and the index it occurred at. Ties go to
    /// the lowest index.
    fn all_reduce_max_loc(&self, value: f64, index: usize) -> (f64, usize) {
        if self.size() == 1 {
            return (value, index);
        }
        let all = self.all_gather_varcount(&[value, index as f64], &vec![2; self.size()]);
        all.chunks_exact(2)
            .map(|c| (c[0], c[1] as usize))
            .fold((f64::NEG_INFINITY, usize::MAX), |best, cand| {
                if cand.0 > best.0 || (cand.0 == best.0 && cand.1 < best.1) { cand } else { best }
            })
    }
}

/// Rank `rank`'s share of `0..n` split into `size` near-equal blocks.
pub fn block_range(n: usize, size: usize, rank: usize) -> Range<usize> {
    let base = n / size;
    let extra = n % size;
    let start = rank * base + rank.min(extra);
    let len = base + usize::from(rank < extra);
    start..start + len
}

/// Communicator selected for a solve.
pub enum UniverseComm {
    Local(LocalComm),
    #[cfg(feature = "mpi")]
    Mpi(MpiComm),
}

impl UniverseComm {
    /// MPI when the cluster backend is requested, the local communicator otherwise.
    pub fn for_backend(backend: AcceleratorBackend) -> Result<Self, BemError> {
        if !backend.contains(AcceleratorBackend::CLUSTER) {
            return Ok(UniverseComm::Local(LocalComm::with_thread_pool()));
        }
        #[cfg(feature = "mpi")]
        {
            Ok(UniverseComm::Mpi(MpiComm::new()?))
        }
        #[cfg(not(feature = "mpi"))]
        {
            Err(BemError::InvalidConfig("cluster backend requested but the `mpi` feature is disabled".into()))
        }
    }

    pub fn as_comm(&self) -> &dyn Comm {
        match self {
            UniverseComm::Local(c) => c,
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(c) => c,
        }
    }
}
