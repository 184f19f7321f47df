//! Top-level entry points: solving for charge densities and evaluating the
//! resulting field.

pub mod solver_context;

pub use solver_context::ChargeDensitySolver;
