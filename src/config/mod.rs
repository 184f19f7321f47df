//! Configuration for charge density solves.

pub mod options;

pub use options::{
    AcceleratorBackend, Algorithm, CheckpointOptions, IntegratorKind, MultipoleOptions, Precision, SolverOptions,
};
