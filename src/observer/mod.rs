//! Callbacks layered onto a running solve.
//!
//! Observers are plain closures registered on an [`ObserverSet`] before the
//! solve starts. Start hooks may hand back a [`SolverState`] to resume from;
//! iteration hooks fire at their own interval; finish hooks see the final
//! statistics. A hook returning an error is logged and counted, and the
//! solve carries on.

pub mod progress;

pub use progress::ProgressReporter;

use crate::error::BemError;
use crate::utils::convergence::SolveStats;
use log::warn;

/// Snapshot of an iterative solve, enough to resume it.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverState<T> {
    pub iteration: usize,
    pub solution: Vec<T>,
    pub residual_history: Vec<T>,
}

/// What an iteration hook sees.
#[derive(Debug)]
pub struct IterationEvent<'a, T> {
    pub solver: &'static str,
    pub iteration: usize,
    /// Relative residual at this iteration.
    pub residual: T,
    pub solution: &'a [T],
    pub residual_history: &'a [T],
}

pub type StartHook<T> = Box<dyn FnMut(usize) -> Result<Option<SolverState<T>>, BemError>>;
pub type IterationHook<T> = Box<dyn FnMut(&IterationEvent<'_, T>) -> Result<(), BemError>>;
pub type FinishHook<T> = Box<dyn FnMut(&SolveStats<T>, &[T]) -> Result<(), BemError>>;

struct Periodic<T> {
    interval: usize,
    last: Option<usize>,
    hook: IterationHook<T>,
}

/// Hook counts of an [`ObserverSet`] at some point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObserverMark {
    start: usize,
    iteration: usize,
    finish: usize,
}

pub struct ObserverSet<T> {
    start: Vec<StartHook<T>>,
    iteration: Vec<Periodic<T>>,
    finish: Vec<FinishHook<T>>,
}

impl<T> Default for ObserverSet<T> {
    fn default() -> Self {
        ObserverSet { start: Vec::new(), iteration: Vec::new(), finish: Vec::new() }
    }
}

impl<T> ObserverSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.iteration.is_empty() && self.finish.is_empty()
    }

    pub fn mark(&self) -> ObserverMark {
        ObserverMark { start: self.start.len(), iteration: self.iteration.len(), finish: self.finish.len() }
    }

    /// Drops every hook registered after `mark` was taken.
    pub fn truncate(&mut self, mark: ObserverMark) {
        self.start.truncate(mark.start);
        self.iteration.truncate(mark.iteration);
        self.finish.truncate(mark.finish);
    }

    /// `hook` receives the system dimension.
    pub fn on_start<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(usize) -> Result<Option<SolverState<T>>, BemError> + 'static,
    {
        self.start.push(Box::new(hook));
        self
    }

    /// `hook` fires once at least `interval` iterations have passed since it
    /// last fired.
    pub fn on_iteration<F>(&mut self, interval: usize, hook: F) -> &mut Self
    where
        F: FnMut(&IterationEvent<'_, T>) -> Result<(), BemError> + 'static,
    {
        self.iteration.push(Periodic { interval: interval.max(1), last: None, hook: Box::new(hook) });
        self
    }

    pub fn on_finish<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&SolveStats<T>, &[T]) -> Result<(), BemError> + 'static,
    {
        self.finish.push(Box::new(hook));
        self
    }

    /// Runs start hooks; the first state offered wins. Returns the state and
    /// the number of failed hooks.
    pub fn fire_start(&mut self, dimension: usize) -> (Option<SolverState<T>>, usize) {
        let mut state = None;
        let mut errors = 0;
        for hook in &mut self.start {
            match hook(dimension) {
                Ok(Some(s)) if state.is_none() => state = Some(s),
                Ok(_) => {}
                Err(e) => {
                    warn!("start observer failed: {e}");
                    errors += 1;
                }
            }
        }
        (state, errors)
    }

    /// Starts every periodic hook's count at `iteration`.
    pub fn reset(&mut self, iteration: usize) {
        for p in &mut self.iteration {
            p.last = Some(iteration);
        }
    }

    pub fn fire_iteration(&mut self, event: &IterationEvent<'_, T>) -> usize {
        let mut errors = 0;
        for p in &mut self.iteration {
            let due = match p.last {
                Some(last) => event.iteration >= last + p.interval,
                None => event.iteration >= p.interval,
            };
            if !due {
                continue;
            }
            p.last = Some(event.iteration);
            if let Err(e) = (p.hook)(event) {
                warn!("iteration observer failed at iteration {}: {e}", event.iteration);
                errors += 1;
            }
        }
        errors
    }

    pub fn fire_finish(&mut self, stats: &SolveStats<T>, solution: &[T]) -> usize {
        let mut errors = 0;
        for hook in &mut self.finish {
            if let Err(e) = hook(stats, solution) {
                warn!("finish observer failed: {e}");
                errors += 1;
            }
        }
        errors
    }
}
