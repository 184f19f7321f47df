//! Per-solve bookkeeping shared by every algorithm.

use crate::core::traits::Real;
use crate::observer::{IterationEvent, ObserverSet, SolverState};
use crate::parallel::Comm;
use crate::utils::convergence::{SolveStats, SolveStatus};
use log::warn;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag that stops a solve at the next iteration boundary.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Connects a running solver to its observers, communicator and
/// cancellation token, and records the residual history.
///
/// Observers fire on rank 0 only; cancellation is agreed on by all ranks.
pub struct SolveMonitor<'a, T> {
    observers: &'a mut ObserverSet<T>,
    comm: &'a dyn Comm,
    cancel: Option<CancellationToken>,
    solver: &'static str,
    history: Vec<T>,
    listener_errors: usize,
    resumed_from: Option<usize>,
}

impl<'a, T: Real> SolveMonitor<'a, T> {
    pub fn new(observers: &'a mut ObserverSet<T>, comm: &'a dyn Comm) -> Self {
        SolveMonitor {
            observers,
            comm,
            cancel: None,
            solver: "solver",
            history: Vec::new(),
            listener_errors: 0,
            resumed_from: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn comm(&self) -> &'a dyn Comm {
        self.comm
    }

    pub fn history(&self) -> &[T] {
        &self.history
    }

    /// Offers the start hooks a chance to resume. On resumption `x` is
    /// overwritten and the iteration to continue from is returned.
    pub fn initialize(&mut self, solver: &'static str, x: &mut [T]) -> usize {
        self.solver = solver;
        self.history.clear();
        let n = x.len();
        let state = if self.comm.is_root() {
            let (state, errors) = self.observers.fire_start(n);
            self.listener_errors += errors;
            state.filter(|s| {
                let fits = s.solution.len() == n;
                if !fits {
                    warn!("discarding resume state with {} unknowns for a system of {n}", s.solution.len());
                }
                fits
            })
        } else {
            None
        };
        let state = self.share_state(state, n);
        let start = match state {
            Some(s) => {
                x.copy_from_slice(&s.solution);
                self.history = s.residual_history;
                self.resumed_from = Some(s.iteration);
                s.iteration
            }
            None => 0,
        };
        self.observers.reset(start);
        start
    }

    fn share_state(&self, state: Option<SolverState<T>>, n: usize) -> Option<SolverState<T>> {
        if self.comm.size() == 1 {
            return state;
        }
        let mut header = match &state {
            Some(s) => [1.0, s.iteration as f64, s.residual_history.len() as f64],
            None => [0.0; 3],
        };
        self.comm.broadcast(&mut header, 0);
        if header[0] == 0.0 {
            return None;
        }
        let m = header[2] as usize;
        let mut payload = match &state {
            Some(s) => s.solution.iter().chain(&s.residual_history).map(|v| v.to_f64_lossy()).collect(),
            None => vec![0.0; n + m],
        };
        self.comm.broadcast(&mut payload, 0);
        let values: Vec<T> = payload.into_iter().map(T::from_f64_lossy).collect();
        Some(SolverState {
            iteration: header[1] as usize,
            solution: values[..n].to_vec(),
            residual_history: values[n..].to_vec(),
        })
    }

    /// Records the relative residual at `iteration` and fires iteration
    /// hooks. Breaks when the solve has been cancelled.
    pub fn record(&mut self, iteration: usize, residual: T, x: &[T]) -> ControlFlow<SolveStatus> {
        self.history.push(residual);
        if self.comm.is_root() {
            let event = IterationEvent {
                solver: self.solver,
                iteration,
                residual,
                solution: x,
                residual_history: &self.history,
            };
            self.listener_errors += self.observers.fire_iteration(&event);
        }
        if self.is_cancelled() {
            ControlFlow::Break(SolveStatus::Cancelled)
        } else {
            ControlFlow::Continue(())
        }
    }

    pub fn is_cancelled(&self) -> bool {
        let local = self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled);
        if self.comm.size() == 1 {
            local
        } else {
            self.comm.all_reduce_max(if local { 1.0 } else { 0.0 }) > 0.0
        }
    }

    /// Completes the statistics and fires finish hooks.
    pub fn finish(&mut self, mut stats: SolveStats<T>, x: &[T]) -> SolveStats<T> {
        stats.residual_history = std::mem::take(&mut self.history);
        stats.resumed_from = self.resumed_from;
        if self.comm.is_root() {
            self.listener_errors += self.observers.fire_finish(&stats, x);
        }
        stats.listener_errors = self.listener_errors;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::thread_comm::ThreadComm;

    #[test]
    fn resume_state_is_broadcast_from_rank_zero() {
        let results = ThreadComm::run(3, |c| {
            let mut observers = ObserverSet::new();
            if c.is_root() {
                observers.on_start(|n| {
                    Ok(Some(SolverState {
                        iteration: 7,
                        solution: (0..n).map(|i| i as f64 + 0.5).collect(),
                        residual_history: vec![1.0, 0.25],
                    }))
                });
            } else {
                // hooks on other ranks never fire
                observers.on_start(|n| {
                    Ok(Some(SolverState { iteration: 99, solution: vec![-1.0; n], residual_history: Vec::new() }))
                });
            }
            let mut monitor = SolveMonitor::new(&mut observers, c);
            let mut x = vec![0.0; 4];
            let start = monitor.initialize("test", &mut x);
            (start, x, monitor.history().to_vec())
        });
        for (start, x, history) in results {
            assert_eq!(start, 7);
            assert_eq!(x, vec![0.5, 1.5, 2.5, 3.5]);
            assert_eq!(history, vec![1.0, 0.25]);
        }
    }

    #[test]
    fn fresh_start_on_every_rank_without_state() {
        let results = ThreadComm::run(2, |c| {
            let mut observers = ObserverSet::<f64>::new();
            let mut monitor = SolveMonitor::new(&mut observers, c);
            let mut x = vec![2.0; 3];
            (monitor.initialize("test", &mut x), x)
        });
        assert_eq!(results, vec![(0, vec![2.0; 3]); 2]);
    }

    #[test]
    fn cancellation_on_one_rank_stops_all() {
        let results = ThreadComm::run(2, |c| {
            let mut observers = ObserverSet::<f64>::new();
            let token = CancellationToken::new();
            if c.rank() == 1 {
                token.cancel();
            }
            let mut monitor = SolveMonitor::new(&mut observers, c).with_cancellation(token);
            monitor.record(1, 0.5, &[0.0])
        });
        assert_eq!(results, vec![ControlFlow::Break(SolveStatus::Cancelled); 2]);
    }
}
