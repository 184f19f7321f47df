//! Charge density solver: one configured solve over a surface container.
//!
//! [`ChargeDensitySolver`] owns the options and the caller's observers. Each
//! call to [`ChargeDensitySolver::solve`] builds the integrator, influence
//! operator, optional multipole operator, communicator and built-in observers
//! for that call only, runs the configured algorithm at the configured
//! precision, and writes the solution into the container's element bases.

use crate::accelerator::select_device;
use crate::checkpoint::CheckpointStore;
use crate::config::{AcceleratorBackend, Algorithm, Precision, SolverOptions};
use crate::core::traits::{InfluenceOperator, Real};
use crate::error::BemError;
use crate::fmm::FmmOperator;
use crate::integrator::{BatchIntegrator, BoundaryIntegrator, make_integrator};
use crate::observer::{ObserverSet, ProgressReporter};
use crate::operator::{BoundaryIntegralMatrix, BoundaryIntegralVector};
use crate::parallel::{Comm, UniverseComm};
use crate::preconditioner::Jacobi;
use crate::solver::{
    BiCgStabSolver, CancellationToken, GaussSeidel, GaussianElimination, GmresSolver, LinearSolver, MultiElementRobinHood,
    RobinHood, SolveMonitor,
};
use crate::surface::SurfaceContainer;
use crate::utils::convergence::SolveStats;
use log::{debug, info, warn};

pub struct ChargeDensitySolver {
    options: SolverOptions,
    cancel: Option<CancellationToken>,
    observers: ObserverSet<f64>,
    single_observers: ObserverSet<f32>,
}

impl ChargeDensitySolver {
    /// Fails fast on an invalid configuration.
    pub fn new(options: SolverOptions) -> Result<Self, BemError> {
        options.validate()?;
        Ok(ChargeDensitySolver {
            options,
            cancel: None,
            observers: ObserverSet::new(),
            single_observers: ObserverSet::new(),
        })
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Observers of double precision solves. They stay registered across solves.
    pub fn observers(&mut self) -> &mut ObserverSet<f64> {
        &mut self.observers
    }

    /// Observers of single precision solves.
    pub fn single_precision_observers(&mut self) -> &mut ObserverSet<f32> {
        &mut self.single_observers
    }

    /// Solves with the communicator the configured backend asks for.
    ///
    /// MPI can only be initialised once per process; to solve repeatedly on a
    /// cluster, create the communicator yourself and use [`Self::solve_with`].
    pub fn solve(&mut self, container: &mut SurfaceContainer) -> Result<SolveStats<f64>, BemError> {
        let universe = UniverseComm::for_backend(self.options.backend)?;
        self.solve_with(container, universe.as_comm())
    }

    pub fn solve_with(&mut self, container: &mut SurfaceContainer, comm: &dyn Comm) -> Result<SolveStats<f64>, BemError> {
        container.validate()?;
        let n = container.dimension();
        info!(
            "solving {n} unknowns with {} ({:?} precision, {:?} integrator) on {} rank(s)",
            self.options.algorithm,
            self.options.precision,
            self.options.integrator,
            comm.size()
        );
        let integrator = self.build_integrator()?;
        let (solution, stats) = match self.options.precision {
            Precision::Double => {
                let mut observers = std::mem::take(&mut self.observers);
                let result = self.run::<f64>(container, integrator.as_ref(), comm, &mut observers);
                self.observers = observers;
                result?
            }
            Precision::Single => {
                let mut observers = std::mem::take(&mut self.single_observers);
                let result = self.run::<f32>(container, integrator.as_ref(), comm, &mut observers);
                self.single_observers = observers;
                let (x, s) = result?;
                (x, widen(s))
            }
        };
        if !stats.converged {
            warn!(
                "{} stopped after {} iterations ({:?}) at relative residual {:.3e}",
                self.options.algorithm, stats.iterations, stats.status, stats.final_residual
            );
        }
        container.write_solution(&solution, stats.iterations);
        Ok(stats)
    }

    fn build_integrator(&self) -> Result<Box<dyn BoundaryIntegrator>, BemError> {
        let host = make_integrator(self.options.integrator);
        if self.options.backend.contains(AcceleratorBackend::GPU) {
            let device = select_device(self.options.backend)?;
            return Ok(Box::new(BatchIntegrator::new(device, host)));
        }
        Ok(host)
    }

    fn run<T: Real>(
        &self,
        container: &SurfaceContainer,
        integrator: &dyn BoundaryIntegrator,
        comm: &dyn Comm,
        observers: &mut ObserverSet<T>,
    ) -> Result<(Vec<f64>, SolveStats<T>), BemError> {
        let mark = observers.mark();
        if self.options.display_interval > 0 {
            ProgressReporter::new(self.options.display_interval).attach(observers);
        }
        if let Some(cp) = &self.options.checkpoint {
            CheckpointStore::new(&cp.directory, container.fingerprint(), self.options.fingerprint(), self.options.precision)
                .attach(observers, cp.interval, cp.resume);
        }
        let result = self.assemble_and_solve::<T>(container, integrator, comm, observers);
        observers.truncate(mark);
        let (x, stats) = result?;
        Ok((x.iter().map(|v| v.to_f64_lossy()).collect(), stats))
    }

    fn assemble_and_solve<T: Real>(
        &self,
        container: &SurfaceContainer,
        integrator: &dyn BoundaryIntegrator,
        comm: &dyn Comm,
        observers: &mut ObserverSet<T>,
    ) -> Result<(Vec<T>, SolveStats<T>), BemError> {
        let matrix = BoundaryIntegralMatrix::<T>::new(container, integrator, self.options.cache_matrix_elements);
        let b = BoundaryIntegralVector::<T>::new(container, integrator, false).to_vec();
        let solved = match &self.options.multipole {
            Some(m) => {
                let fmm = FmmOperator::new(&matrix, m)?;
                self.dispatch(&fmm, &b, comm, observers)
            }
            None => self.dispatch(&matrix, &b, comm, observers),
        };
        if matrix.is_cached() {
            debug!("entry cache holds {} entries over {} rows", matrix.cached_entries(), matrix.cached_rows());
        }
        solved
    }

    fn dispatch<T: Real, A: InfluenceOperator<T> + ?Sized>(
        &self,
        a: &A,
        b: &[T],
        comm: &dyn Comm,
        observers: &mut ObserverSet<T>,
    ) -> Result<(Vec<T>, SolveStats<T>), BemError> {
        let o = &self.options;
        let n = a.dimension();
        let tol = T::from_f64_lossy(o.tolerance);
        let max_iters = o.resolved_max_iterations(n);
        let check = o.resolved_check_interval(n);
        let mut x = vec![T::zero(); n];
        let mut monitor = SolveMonitor::new(observers, comm);
        if let Some(token) = &self.cancel {
            monitor = monitor.with_cancellation(token.clone());
        }
        let krylov = matches!(o.algorithm, Algorithm::BiCgStab | Algorithm::Gmres);
        let jacobi = if krylov && o.jacobi_preconditioner { Some(Jacobi::from_operator(a)?) } else { None };

        let stats = match o.algorithm {
            Algorithm::Direct => GaussianElimination::new(tol).solve(a, b, &mut x, &mut monitor)?,
            Algorithm::Relaxation => GaussSeidel::new(tol, max_iters).with_check_interval(check).solve(a, b, &mut x, &mut monitor)?,
            Algorithm::GreedyCorrection => RobinHood::new(tol, max_iters, check).solve(a, b, &mut x, &mut monitor)?,
            Algorithm::BlockCorrection => {
                MultiElementRobinHood::new(tol, max_iters, check, o.subspace_dimension).solve(a, b, &mut x, &mut monitor)?
            }
            Algorithm::BiCgStab => {
                let mut solver = BiCgStabSolver::new(tol, max_iters);
                if let Some(pc) = &jacobi {
                    solver = solver.with_preconditioner(pc);
                }
                solver.solve(a, b, &mut x, &mut monitor)?
            }
            Algorithm::Gmres => {
                let mut solver = GmresSolver::new(o.restart, tol, max_iters);
                if let Some(pc) = &jacobi {
                    solver = solver.with_preconditioner(pc);
                }
                solver.solve(a, b, &mut x, &mut monitor)?
            }
        };
        info!(
            "{}: {:?} after {} iterations, relative residual {:.3e}",
            o.algorithm,
            stats.status,
            stats.iterations,
            stats.final_residual.to_f64_lossy()
        );
        Ok((x, stats))
    }
}

fn widen(s: SolveStats<f32>) -> SolveStats<f64> {
    SolveStats {
        iterations: s.iterations,
        final_residual: s.final_residual as f64,
        converged: s.converged,
        status: s.status,
        residual_history: s.residual_history.into_iter().map(f64::from).collect(),
        resumed_from: s.resumed_from,
        listener_errors: s.listener_errors,
    }
}
