//! Boundary elements: a shape, the condition it imposes, and its unknowns.

use super::shape::{Point3, Shape};
use crate::error::BemError;
use crate::utils::Fingerprint;

/// The condition an element's collocation equation enforces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundaryCondition {
    /// Conductor held at a fixed potential (volts).
    Dirichlet { potential: f64 },
    /// Dielectric interface. `flux_ratio` is the normal boundary flux ratio
    /// ε(behind the normal) / ε(in front of the normal).
    Neumann { flux_ratio: f64 },
}

/// Which kind of row an element contributes to the linear system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BasisRole {
    Dirichlet,
    Neumann,
}

impl BoundaryCondition {
    pub fn role(&self) -> BasisRole {
        match self {
            BoundaryCondition::Dirichlet { .. } => BasisRole::Dirichlet,
            BoundaryCondition::Neumann { .. } => BasisRole::Neumann,
        }
    }

    /// Right-hand side of the collocation equation.
    pub fn boundary_value(&self) -> f64 {
        match self {
            BoundaryCondition::Dirichlet { potential } => *potential,
            BoundaryCondition::Neumann { .. } => 0.0,
        }
    }
}

/// Unknown coefficients attached to an element.
#[derive(Clone, Debug, PartialEq)]
pub struct Basis {
    values: Vec<f64>,
    committed: Option<usize>,
}

impl Basis {
    /// One scalar surface charge density.
    pub fn electrostatic() -> Self {
        Basis { values: vec![0.0], committed: None }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Iteration the stored values were produced by, `None` while unset.
    pub fn committed_iteration(&self) -> Option<usize> {
        self.committed
    }

    pub fn is_set(&self) -> bool {
        self.committed.is_some()
    }

    pub(crate) fn commit(&mut self, values: &[f64], iteration: usize) {
        self.values.copy_from_slice(values);
        self.committed = Some(iteration);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryElement {
    pub shape: Shape,
    pub boundary: BoundaryCondition,
    basis: Basis,
}

impl BoundaryElement {
    pub fn new(shape: impl Into<Shape>, boundary: BoundaryCondition) -> Self {
        BoundaryElement { shape: shape.into(), boundary, basis: Basis::electrostatic() }
    }

    pub fn dirichlet(shape: impl Into<Shape>, potential: f64) -> Self {
        Self::new(shape, BoundaryCondition::Dirichlet { potential })
    }

    pub fn neumann(shape: impl Into<Shape>, flux_ratio: f64) -> Self {
        Self::new(shape, BoundaryCondition::Neumann { flux_ratio })
    }

    pub fn basis(&self) -> &Basis {
        &self.basis
    }

    pub(crate) fn basis_mut(&mut self) -> &mut Basis {
        &mut self.basis
    }

    pub fn role(&self) -> BasisRole {
        self.boundary.role()
    }

    pub fn centroid(&self) -> Point3 {
        self.shape.centroid()
    }

    pub fn normal(&self) -> Point3 {
        self.shape.normal()
    }

    pub fn area(&self) -> f64 {
        self.shape.area()
    }

    /// Solved surface charge density, if the basis has been written.
    pub fn charge_density(&self) -> Option<f64> {
        self.basis.is_set().then(|| self.basis.values()[0])
    }

    pub fn check(&self) -> Result<(), BemError> {
        self.shape.check()?;
        if let BoundaryCondition::Neumann { flux_ratio } = self.boundary {
            if !flux_ratio.is_finite() || flux_ratio <= 0.0 {
                return Err(BemError::InvalidConfig(format!(
                    "normal boundary flux ratio must be positive, got {flux_ratio}"
                )));
            }
            if (flux_ratio - 1.0).abs() < 1e-12 {
                return Err(BemError::DegenerateGeometry(
                    "dielectric interface with equal permittivity on both sides".into(),
                ));
            }
            if matches!(self.shape, Shape::LineSegment(_)) {
                return Err(BemError::DegenerateGeometry(
                    "line segments cannot carry a dielectric boundary".into(),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn hash_into(&self, fp: &mut Fingerprint) {
        self.shape.hash_into(fp);
        match self.boundary {
            BoundaryCondition::Dirichlet { potential } => fp.u64(1).f64(potential),
            BoundaryCondition::Neumann { flux_ratio } => fp.u64(2).f64(flux_ratio),
        };
    }
}
