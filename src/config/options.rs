//! Solver options.
//!
//! `SolverOptions` is the single configuration record for a charge density
//! solve. It deserializes from JSON with every field optional; missing
//! fields take the defaults below. Algorithm names are also accepted in
//! their common long forms ("gauss-seidel", "robin-hood", ...).

use crate::error::BemError;
use crate::utils::Fingerprint;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Linear solver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Gaussian elimination on the materialized matrix.
    Direct,
    /// Gauss-Seidel sweeps.
    Relaxation,
    /// Robin Hood: correct the element with the largest residual.
    #[default]
    GreedyCorrection,
    /// Multi-element Robin Hood: correct the `subspace_dimension` largest residuals together.
    BlockCorrection,
    #[serde(rename = "bicgstab")]
    BiCgStab,
    Gmres,
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Direct => "direct",
            Algorithm::Relaxation => "relaxation",
            Algorithm::GreedyCorrection => "greedy-correction",
            Algorithm::BlockCorrection => "block-correction",
            Algorithm::BiCgStab => "bicgstab",
            Algorithm::Gmres => "gmres",
        }
    }

    fn tag(&self) -> u64 {
        match self {
            Algorithm::Direct => 1,
            Algorithm::Relaxation => 2,
            Algorithm::GreedyCorrection => 3,
            Algorithm::BlockCorrection => 4,
            Algorithm::BiCgStab => 5,
            Algorithm::Gmres => 6,
        }
    }
}

impl FromStr for Algorithm {
    type Err = BemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match key.as_str() {
            "direct" | "gaussian-elimination" | "lu" => Ok(Algorithm::Direct),
            "relaxation" | "gauss-seidel" | "gs" => Ok(Algorithm::Relaxation),
            "greedy-correction" | "robin-hood" | "rh" => Ok(Algorithm::GreedyCorrection),
            "block-correction" | "multi-element-robin-hood" | "merh" => Ok(Algorithm::BlockCorrection),
            "bicgstab" | "bi-cgstab" => Ok(Algorithm::BiCgStab),
            "gmres" => Ok(Algorithm::Gmres),
            _ => Err(BemError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Floating-point width used for the whole solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Single,
    #[default]
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IntegratorKind {
    #[default]
    Analytic,
    Numeric,
}

bitflags! {
    /// Execution layers enabled on top of the host thread pool.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AcceleratorBackend: u8 {
        const GPU     = 0b01;
        const CLUSTER = 0b10;
    }
}

impl Default for AcceleratorBackend {
    fn default() -> Self {
        AcceleratorBackend::empty()
    }
}

impl FromStr for AcceleratorBackend {
    type Err = BemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(AcceleratorBackend::empty()),
            "gpu" => Ok(AcceleratorBackend::GPU),
            "cluster" | "mpi" => Ok(AcceleratorBackend::CLUSTER),
            "both" | "gpu+cluster" | "cluster+gpu" => Ok(AcceleratorBackend::all()),
            other => Err(BemError::InvalidConfig(format!("unknown accelerator backend '{other}'"))),
        }
    }
}

/// Fast multipole parameters. Present in [`SolverOptions`] only when the
/// matrix-vector product should be accelerated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultipoleOptions {
    /// Total degree of the Taylor expansions.
    #[serde(default = "default_degree")]
    pub degree: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Nodes within this many boxes of each other interact directly.
    #[serde(default = "default_neighbor_order")]
    pub neighbor_order: usize,
    #[serde(default = "default_leaf_capacity")]
    pub leaf_capacity: usize,
}

fn default_degree() -> usize {
    6
}

fn default_max_depth() -> usize {
    6
}

fn default_neighbor_order() -> usize {
    1
}

fn default_leaf_capacity() -> usize {
    16
}

impl Default for MultipoleOptions {
    fn default() -> Self {
        MultipoleOptions {
            degree: default_degree(),
            max_depth: default_max_depth(),
            neighbor_order: default_neighbor_order(),
            leaf_capacity: default_leaf_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointOptions {
    #[serde(default = "default_checkpoint_dir")]
    pub directory: PathBuf,
    /// Iterations between writes; 0 writes only at the end of the solve.
    #[serde(default = "default_checkpoint_interval")]
    pub interval: usize,
    /// Continue from a matching checkpoint when one exists.
    #[serde(default = "default_true")]
    pub resume: bool,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_checkpoint_interval() -> usize {
    100
}

fn default_true() -> bool {
    true
}

impl Default for CheckpointOptions {
    fn default() -> Self {
        CheckpointOptions {
            directory: default_checkpoint_dir(),
            interval: default_checkpoint_interval(),
            resume: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Iteration cap; resolved per algorithm when unset.
    #[serde(default)]
    pub max_iterations: Option<usize>,
    /// Iterations between convergence checks; resolved per algorithm when unset.
    #[serde(default)]
    pub check_interval: Option<usize>,
    /// Block size of the block-correction solver.
    #[serde(default = "default_subspace_dimension")]
    pub subspace_dimension: usize,
    /// GMRES restart length.
    #[serde(default = "default_restart")]
    pub restart: usize,
    #[serde(default)]
    pub cache_matrix_elements: bool,
    #[serde(default)]
    pub precision: Precision,
    #[serde(default)]
    pub integrator: IntegratorKind,
    #[serde(default)]
    pub backend: AcceleratorBackend,
    #[serde(default)]
    pub multipole: Option<MultipoleOptions>,
    /// Iterations between progress reports; 0 disables them.
    #[serde(default)]
    pub display_interval: usize,
    #[serde(default)]
    pub checkpoint: Option<CheckpointOptions>,
    /// Diagonal preconditioning for the Krylov solvers.
    #[serde(default)]
    pub jacobi_preconditioner: bool,
}

fn default_tolerance() -> f64 {
    1e-8
}

fn default_subspace_dimension() -> usize {
    2
}

fn default_restart() -> usize {
    30
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            algorithm: Algorithm::default(),
            tolerance: default_tolerance(),
            max_iterations: None,
            check_interval: None,
            subspace_dimension: default_subspace_dimension(),
            restart: default_restart(),
            cache_matrix_elements: false,
            precision: Precision::default(),
            integrator: IntegratorKind::default(),
            backend: AcceleratorBackend::default(),
            multipole: None,
            display_interval: 0,
            checkpoint: None,
            jacobi_preconditioner: false,
        }
    }
}

impl SolverOptions {
    pub fn new(algorithm: Algorithm) -> Self {
        SolverOptions { algorithm, ..Default::default() }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_multipole(mut self, multipole: MultipoleOptions) -> Self {
        self.multipole = Some(multipole);
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: CheckpointOptions) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, BemError> {
        let options: SolverOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, BemError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<(), BemError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(BemError::InvalidConfig(format!("tolerance must be positive, got {}", self.tolerance)));
        }
        if self.max_iterations == Some(0) {
            return Err(BemError::InvalidConfig("max_iterations must be at least 1".into()));
        }
        if self.check_interval == Some(0) {
            return Err(BemError::InvalidConfig("check_interval must be at least 1".into()));
        }
        if self.algorithm == Algorithm::BlockCorrection && self.subspace_dimension < 1 {
            return Err(BemError::InvalidConfig("subspace_dimension must be at least 1".into()));
        }
        if self.algorithm == Algorithm::Gmres && self.restart < 1 {
            return Err(BemError::InvalidConfig("restart must be at least 1".into()));
        }
        if let Some(m) = &self.multipole {
            if m.leaf_capacity == 0 {
                return Err(BemError::InvalidConfig("multipole leaf_capacity must be at least 1".into()));
            }
            if m.max_depth == 0 || m.max_depth > 20 {
                return Err(BemError::InvalidConfig(format!("multipole max_depth must be in 1..=20, got {}", m.max_depth)));
            }
            if m.degree > 16 {
                return Err(BemError::InvalidConfig(format!("multipole degree must be at most 16, got {}", m.degree)));
            }
            if m.neighbor_order == 0 {
                return Err(BemError::InvalidConfig("multipole neighbor_order must be at least 1".into()));
            }
        }
        Ok(())
    }

    /// Iteration cap for a system of `dimension` unknowns.
    pub fn resolved_max_iterations(&self, dimension: usize) -> usize {
        if let Some(cap) = self.max_iterations {
            return cap;
        }
        let n = dimension.max(1);
        match self.algorithm {
            Algorithm::Direct => 1,
            Algorithm::Relaxation => 1000,
            Algorithm::GreedyCorrection => 200 * n,
            Algorithm::BlockCorrection => (200 * n / self.subspace_dimension.max(1)).max(1),
            Algorithm::BiCgStab | Algorithm::Gmres => (2 * n).max(1000),
        }
    }

    /// Iterations between convergence checks for `dimension` unknowns.
    ///
    /// The greedy solvers update one element (or one block) per iteration,
    /// so their default is one pass over the system.
    pub fn resolved_check_interval(&self, dimension: usize) -> usize {
        if let Some(k) = self.check_interval {
            return k;
        }
        match self.algorithm {
            Algorithm::GreedyCorrection => dimension.max(1),
            Algorithm::BlockCorrection => (dimension / self.subspace_dimension.max(1)).max(1),
            _ => 1,
        }
    }

    /// Hash of the settings that change the iterates. Tolerance, caps,
    /// reporting and checkpoint settings are left out so a resumed solve may
    /// tighten or extend them.
    pub fn fingerprint(&self) -> u64 {
        let mut fp = Fingerprint::new();
        fp.u64(self.algorithm.tag())
            .u64(matches!(self.precision, Precision::Single) as u64)
            .u64(matches!(self.integrator, IntegratorKind::Numeric) as u64)
            .u64(self.subspace_dimension as u64)
            .u64(self.restart as u64)
            .u64(self.jacobi_preconditioner as u64)
            .u64(self.backend.bits() as u64);
        match &self.multipole {
            Some(m) => fp.u64(1).u64(m.degree as u64).u64(m.max_depth as u64).u64(m.neighbor_order as u64).u64(m.leaf_capacity as u64),
            None => fp.u64(0),
        };
        fp.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_names_parse() {
        assert_eq!("gauss-seidel".parse::<Algorithm>().unwrap(), Algorithm::Relaxation);
        assert_eq!("Robin_Hood".parse::<Algorithm>().unwrap(), Algorithm::GreedyCorrection);
        assert_eq!("multi-element-robin-hood".parse::<Algorithm>().unwrap(), Algorithm::BlockCorrection);
        assert_eq!("BiCGStab".parse::<Algorithm>().unwrap(), Algorithm::BiCgStab);
        assert!(matches!("conjugate".parse::<Algorithm>(), Err(BemError::UnknownAlgorithm(_))));
    }

    #[test]
    fn json_defaults_and_validation() {
        let o = SolverOptions::from_json_str(r#"{"algorithm": "gmres", "multipole": {"degree": 4}}"#).unwrap();
        assert_eq!(o.algorithm, Algorithm::Gmres);
        assert_eq!(o.tolerance, 1e-8);
        assert_eq!(o.multipole.unwrap().degree, 4);
        assert_eq!(o.multipole.unwrap().leaf_capacity, 16);
        assert!(matches!(SolverOptions::from_json_str(r#"{"tolerance": -1.0}"#), Err(BemError::InvalidConfig(_))));
        assert!(matches!(SolverOptions::from_json_str(r#"{"algorithm": "cg"}"#), Err(BemError::Json(_))));
    }

    #[test]
    fn empty_sections_take_the_documented_defaults() {
        let m: MultipoleOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(m, MultipoleOptions::default());
        assert_eq!((m.degree, m.max_depth, m.neighbor_order, m.leaf_capacity), (6, 6, 1, 16));
        let c: CheckpointOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(c, CheckpointOptions::default());
        assert_eq!((c.directory, c.interval, c.resume), (PathBuf::from("checkpoints"), 100, true));
        let o = SolverOptions::from_json_str("{}").unwrap();
        assert_eq!((o.tolerance, o.subspace_dimension, o.restart), (1e-8, 2, 30));
    }

    #[test]
    fn fingerprint_ignores_tolerance() {
        let a = SolverOptions::new(Algorithm::GreedyCorrection);
        let b = a.clone().with_tolerance(1e-3).with_max_iterations(10);
        assert_eq!(a.fingerprint(), b.fingerprint());
        let c = a.clone().with_precision(Precision::Single);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn defaults_resolve_per_algorithm() {
        let rh = SolverOptions::new(Algorithm::GreedyCorrection);
        assert_eq!(rh.resolved_check_interval(40), 40);
        let mut merh = SolverOptions::new(Algorithm::BlockCorrection);
        merh.subspace_dimension = 4;
        assert_eq!(merh.resolved_check_interval(40), 10);
        assert_eq!(SolverOptions::new(Algorithm::Direct).resolved_max_iterations(40), 1);
        assert_eq!("both".parse::<AcceleratorBackend>().unwrap(), AcceleratorBackend::all());
    }
}
