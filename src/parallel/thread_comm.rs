// In-process communicator with one thread per rank, for exercising the
// multi-rank code paths without MPI.

use super::Comm;
use std::sync::{Arc, Barrier, Mutex};

struct Shared {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Vec<f64>>>,
}

pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Runs `f` once per rank on its own thread and returns the results in
    /// rank order.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(&ThreadComm) -> R + Sync,
    {
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new(vec![Vec::new(); size]),
        });
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..size)
                .map(|rank| {
                    let comm = ThreadComm { rank, shared: Arc::clone(&shared) };
                    let f = &f;
                    s.spawn(move || f(&comm))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    /// Every rank's contribution, in rank order.
    fn exchange(&self, local: &[f64]) -> Vec<Vec<f64>> {
        self.shared.slots.lock().unwrap()[self.rank] = local.to_vec();
        self.shared.barrier.wait();
        let all = self.shared.slots.lock().unwrap().clone();
        // nobody writes the next round before everyone has read this one
        self.shared.barrier.wait();
        all
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn all_reduce_sum(&self, x: f64) -> f64 {
        self.exchange(&[x]).iter().map(|v| v[0]).sum()
    }

    fn all_reduce_max(&self, x: f64) -> f64 {
        self.exchange(&[x]).iter().map(|v| v[0]).fold(f64::NEG_INFINITY, f64::max)
    }

    fn all_gather_varcount(&self, local: &[f64], counts: &[usize]) -> Vec<f64> {
        assert_eq!(local.len(), counts[self.rank], "local block does not match its count");
        self.exchange(local).concat()
    }

    fn broadcast(&self, data: &mut [f64], root: usize) {
        let payload = if self.rank == root { data.to_vec() } else { Vec::new() };
        let all = self.exchange(&payload);
        data.copy_from_slice(&all[root]);
    }
}
