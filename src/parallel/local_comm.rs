// Single-process communicator; parallelism comes from the rayon pool.

use log::debug;

#[derive(Clone, Copy, Debug, Default)]
pub struct LocalComm;

impl LocalComm {
    pub fn new() -> Self {
        LocalComm
    }

    /// Sizes the global rayon pool to the machine. Only the first call in a
    /// process has an effect.
    pub fn with_thread_pool() -> Self {
        let threads = num_cpus::get();
        if rayon::ThreadPoolBuilder::new().num_threads(threads).build_global().is_ok() {
            debug!("rayon pool sized to {threads} threads");
        }
        LocalComm
    }
}

impl super::Comm for LocalComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn all_reduce_sum(&self, x: f64) -> f64 {
        x
    }

    fn all_reduce_max(&self, x: f64) -> f64 {
        x
    }

    fn all_gather_varcount(&self, local: &[f64], _counts: &[usize]) -> Vec<f64> {
        local.to_vec()
    }

    fn broadcast(&self, _data: &mut [f64], _root: usize) {}
}
