use super::{IterationEvent, ObserverSet};
use crate::core::traits::Real;
use crate::utils::convergence::SolveStats;
use log::info;
use std::time::Instant;

/// Logs the residual every `interval` iterations and a summary at the end.
pub struct ProgressReporter {
    interval: usize,
}

impl ProgressReporter {
    pub fn new(interval: usize) -> Self {
        ProgressReporter { interval: interval.max(1) }
    }

    pub fn attach<T: Real>(self, observers: &mut ObserverSet<T>) {
        let started = Instant::now();
        observers.on_iteration(self.interval, move |e: &IterationEvent<'_, T>| {
            info!(
                "{} iteration {:>8}: relative residual {:.3e} ({:.1?} elapsed)",
                e.solver,
                e.iteration,
                e.residual.to_f64_lossy(),
                started.elapsed()
            );
            Ok(())
        });
        observers.on_finish(move |stats: &SolveStats<T>, _| {
            info!(
                "solve finished after {} iterations: {:?}, relative residual {:.3e}, {:.1?}",
                stats.iterations,
                stats.status,
                stats.final_residual.to_f64_lossy(),
                started.elapsed()
            );
            Ok(())
        });
    }
}
