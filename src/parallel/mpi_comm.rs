//! MPI communicator.
//!
//! `MpiComm` owns the MPI universe, so the environment stays initialized
//! for as long as the communicator lives and is finalized when it drops.
//! MPI can be initialized once per process; constructing a second
//! communicator fails with [`BemError::Communication`].
//!
//! # Example
//! ```no_run
//! # #[cfg(feature = "mpi")] {
//! use electrobem::parallel::{Comm, MpiComm};
//! let comm = MpiComm::new().expect("MPI");
//! println!("Rank: {} / {}", comm.rank(), comm.size());
//! comm.barrier();
//! # }
//! ```

use crate::error::BemError;
use mpi::collective::SystemOperation;
use mpi::datatype::PartitionMut;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;

pub struct MpiComm {
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
    // dropped last: finalizes MPI
    _universe: Universe,
}

impl MpiComm {
    pub fn new() -> Result<Self, BemError> {
        let universe = mpi::initialize()
            .ok_or_else(|| BemError::Communication("MPI is already initialized in this process".into()))?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        log::info!("MPI rank {rank} of {size} ready");
        Ok(MpiComm { world, rank, size, _universe: universe })
    }
}

impl super::Comm for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.world.barrier();
    }

    fn all_reduce_sum(&self, x: f64) -> f64 {
        let mut y = 0.0;
        self.world.all_reduce_into(&x, &mut y, SystemOperation::sum());
        y
    }

    fn all_reduce_max(&self, x: f64) -> f64 {
        let mut y = 0.0;
        self.world.all_reduce_into(&x, &mut y, SystemOperation::max());
        y
    }

    fn all_gather_varcount(&self, local: &[f64], counts: &[usize]) -> Vec<f64> {
        let total: usize = counts.iter().sum();
        let counts: Vec<Count> = counts.iter().map(|&c| c as Count).collect();
        let displs: Vec<Count> = counts
            .iter()
            .scan(0, |acc, &c| {
                let d = *acc;
                *acc += c;
                Some(d)
            })
            .collect();
        let mut out = vec![0.0; total];
        {
            let mut partition = PartitionMut::new(&mut out[..], counts, &displs[..]);
            self.world.all_gather_varcount_into(local, &mut partition);
        }
        out
    }

    fn broadcast(&self, data: &mut [f64], root: usize) {
        self.world.process_at_rank(root as i32).broadcast_into(data);
    }
}
