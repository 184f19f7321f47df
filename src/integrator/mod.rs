//! Kernel evaluation: boundary integrals between source and target elements.
//!
//! Every integrator answers the same questions (potential and field of a
//! unit-density source at a point), and the collocation equations of the
//! linear system are assembled from those answers in one place:
//!
//! - Dirichlet rows: potential of the source at the target collocation
//!   point, right-hand side the prescribed potential.
//! - Neumann rows: field of the source projected on the target normal,
//!   right-hand side zero, plus `(1 + r)/(1 − r) / (2ε0)` on the diagonal
//!   where `r` is the normal boundary flux ratio.

pub mod analytic;
pub mod batch;
pub mod conic;
pub mod numeric;
pub mod quadrature;

pub use analytic::AnalyticIntegrator;
pub use batch::BatchIntegrator;
pub use numeric::NumericIntegrator;

use crate::config::IntegratorKind;
use crate::error::BemError;
use crate::surface::{BasisRole, BoundaryCondition, BoundaryElement, Point3, Shape};
use rayon::prelude::*;
use std::f64::consts::PI;

/// Vacuum permittivity in F/m.
pub const EPS0: f64 = 8.854187817e-12;
/// 1 / (4πε0)
pub const COULOMB: f64 = 1.0 / (4.0 * PI * EPS0);

/// Point at which an element's collocation equation is enforced.
///
/// Wires are collocated on their surface rather than on the axis that
/// carries their line charge.
pub fn collocation_point(element: &BoundaryElement) -> Point3 {
    match &element.shape {
        Shape::LineSegment(l) => l.centroid() + l.normal() * (0.5 * l.diameter),
        shape => shape.centroid(),
    }
}

/// Diagonal jump term of a Neumann row.
pub fn neumann_self_term(flux_ratio: f64) -> f64 {
    (1.0 + flux_ratio) / (1.0 - flux_ratio) / (2.0 * EPS0)
}

pub trait BoundaryIntegrator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Potential at `point` of `source` carrying unit surface charge density.
    fn potential(&self, source: &Shape, point: &Point3) -> f64;

    /// Field at `point` of `source` carrying unit surface charge density.
    fn electric_field(&self, source: &Shape, point: &Point3) -> Point3;

    fn field_and_potential(&self, source: &Shape, point: &Point3) -> (Point3, f64) {
        (self.electric_field(source, point), self.potential(source, point))
    }

    fn boundary_value(&self, target: &BoundaryElement) -> f64 {
        target.boundary.boundary_value()
    }

    fn basis_role(&self, target: &BoundaryElement) -> BasisRole {
        target.role()
    }

    /// Influence of `source` on the collocation equation of `target`.
    /// `coincident` is set when both are the same element.
    fn boundary_integral(&self, source: &BoundaryElement, target: &BoundaryElement, coincident: bool) -> f64 {
        let p = collocation_point(target);
        match target.boundary {
            BoundaryCondition::Dirichlet { .. } => self.potential(&source.shape, &p),
            BoundaryCondition::Neumann { flux_ratio } => {
                let en = self.electric_field(&source.shape, &p).dot(&target.normal());
                if coincident { en + neumann_self_term(flux_ratio) } else { en }
            }
        }
    }

    /// Influence of one source on many targets; `self_index` is the position
    /// of the source within `targets`, if present.
    fn boundary_integrals(&self, source: &BoundaryElement, targets: &[BoundaryElement], self_index: Option<usize>) -> Vec<f64> {
        targets
            .iter()
            .enumerate()
            .map(|(i, t)| self.boundary_integral(source, t, Some(i) == self_index))
            .collect()
    }

    /// Whether `influence_block` is cheaper than entry-by-entry evaluation.
    fn prefers_batches(&self) -> bool {
        false
    }

    /// Dense block of influences, `out[t * sources.len() + s]` for element
    /// indices into `elements`.
    fn influence_block(&self, elements: &[BoundaryElement], sources: &[usize], targets: &[usize]) -> Result<Vec<f64>, BemError> {
        let ns = sources.len();
        let mut out = vec![0.0; targets.len() * ns];
        if ns == 0 {
            return Ok(out);
        }
        out.par_chunks_mut(ns).zip(targets.par_iter()).for_each(|(row, &t)| {
            for (v, &s) in row.iter_mut().zip(sources) {
                *v = self.boundary_integral(&elements[s], &elements[t], s == t);
            }
        });
        Ok(out)
    }
}

/// Builds the host integrator for `kind`.
pub fn make_integrator(kind: IntegratorKind) -> Box<dyn BoundaryIntegrator> {
    match kind {
        IntegratorKind::Analytic => Box::new(AnalyticIntegrator::new()),
        IntegratorKind::Numeric => Box::new(NumericIntegrator::new()),
    }
}
