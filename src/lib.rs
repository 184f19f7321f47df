//! electrobem: boundary element electrostatics over Faer
//!
//! A surface is described by a [`SurfaceContainer`] of boundary elements
//! (conductors at fixed potential, dielectric interfaces with a fixed flux
//! ratio). The crate solves for the surface charge densities that satisfy the
//! collocation equations and evaluates the resulting potential and field.
//!
//! The influence matrix is never stored unless asked to: entries are
//! integrated on demand, optionally cached, optionally replaced in products by
//! a fast multipole approximation. Solvers run on one process with rayon, or
//! across processes with MPI (`mpi` feature); kernel batches may run on a GPU
//! (`gpu` feature).
//!
//! ```rust,no_run
//! use electrobem::{Algorithm, ChargeDensitySolver, SolverOptions};
//! use electrobem::surface::generators::SphericalCapacitor;
//!
//! let capacitor = SphericalCapacitor::default();
//! let mut surface = capacitor.triangulated(2);
//! let mut solver = ChargeDensitySolver::new(SolverOptions::new(Algorithm::Gmres))?;
//! let stats = solver.solve(&mut surface)?;
//! println!("{} iterations, Q = {:e}", stats.iterations, surface.total_charge());
//! # Ok::<(), electrobem::BemError>(())
//! ```

pub mod accelerator;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod field;
pub mod fmm;
pub mod integrator;
pub mod matrix;
pub mod observer;
pub mod operator;
pub mod parallel;
pub mod preconditioner;
pub mod solver;
pub mod surface;
pub mod utils;

// Re-exports for convenience
pub use config::*;
pub use context::*;
pub use core::traits::{InfluenceOperator, InnerProduct, MatVec, Real};
pub use error::*;
pub use field::IntegratingFieldSolver;
pub use fmm::FmmOperator;
pub use integrator::{AnalyticIntegrator, BoundaryIntegrator, NumericIntegrator};
pub use observer::{ObserverSet, SolverState};
pub use operator::{BoundaryIntegralMatrix, BoundaryIntegralVector};
pub use solver::{
    BiCgStabSolver, CancellationToken, GaussSeidel, GaussianElimination, GmresSolver, LinearSolver, MultiElementRobinHood,
    RobinHood, SolveMonitor,
};
pub use surface::{BoundaryElement, SurfaceContainer};

// Re-export SolveStats at the crate root for convenience
pub use utils::convergence::{SolveStats, SolveStatus};
