//! Quadrature kernels with analytic fallback near the source.
//!
//! Far targets see the element as a cloud of weighted point charges. The
//! rule is refined as the target approaches; once it is within one element
//! size the closed form takes over, which also covers the self term.

use super::analytic::AnalyticIntegrator;
use super::quadrature::polygon_quadrature;
use super::{BoundaryIntegrator, COULOMB, conic};
use crate::surface::{Point3, Shape};

#[derive(Clone, Copy, Debug)]
pub struct NumericIntegrator {
    /// Distance, in element sizes, below which the closed form is used.
    pub near_ratio: f64,
    analytic: AnalyticIntegrator,
}

impl Default for NumericIntegrator {
    fn default() -> Self {
        NumericIntegrator { near_ratio: 1.0, analytic: AnalyticIntegrator }
    }
}

impl NumericIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refinement levels for a target `ratio` element sizes away, or `None`
    /// when the closed form should be used.
    pub fn refinement(&self, ratio: f64) -> Option<usize> {
        if ratio < self.near_ratio {
            None
        } else if ratio < 2.0 {
            Some(3)
        } else if ratio < 4.0 {
            Some(2)
        } else if ratio < 10.0 {
            Some(1)
        } else {
            Some(0)
        }
    }

    fn levels_for(&self, source: &Shape, point: &Point3) -> Option<usize> {
        let ratio = (point - source.centroid()).norm() / source.size();
        self.refinement(ratio)
    }
}

/// Sums the point-charge kernel over a weighted point set.
pub(crate) fn point_cloud_field_and_potential(points: &[(Point3, f64)], p: &Point3) -> (Point3, f64) {
    let (e, phi) = points.iter().fold((Point3::zeros(), 0.0), |(e, phi), (q, w)| {
        let d = p - q;
        let r = d.norm();
        (e + d * (w / (r * r * r)), phi + w / r)
    });
    (e * COULOMB, phi * COULOMB)
}

impl BoundaryIntegrator for NumericIntegrator {
    fn name(&self) -> &'static str {
        "numeric"
    }

    fn potential(&self, source: &Shape, point: &Point3) -> f64 {
        self.field_and_potential(source, point).1
    }

    fn electric_field(&self, source: &Shape, point: &Point3) -> Point3 {
        self.field_and_potential(source, point).0
    }

    fn field_and_potential(&self, source: &Shape, point: &Point3) -> (Point3, f64) {
        if let Shape::ConicSection(c) = source {
            return (conic::electric_field(c, point), conic::potential(c, point));
        }
        match self.levels_for(source, point) {
            Some(levels) => point_cloud_field_and_potential(&polygon_quadrature(source, levels), point),
            None => self.analytic.field_and_potential(source, point),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{LineSegment, Triangle};
    use approx::assert_relative_eq;

    #[test]
    fn agrees_with_closed_form() {
        let t: Shape = Triangle::from_vertices(Point3::zeros(), Point3::new(0.5, 0.0, 0.0), Point3::new(0.1, 0.4, 0.0)).into();
        let w: Shape = LineSegment::new(Point3::zeros(), Point3::new(0.3, 0.0, 0.0), 0.002).into();
        let numeric = NumericIntegrator::new();
        let analytic = AnalyticIntegrator::new();
        for shape in [&t, &w] {
            for p in [Point3::new(0.2, 0.1, 0.6), Point3::new(1.0, -0.5, 0.3), Point3::new(-3.0, 4.0, 1.0)] {
                let (e_n, phi_n) = numeric.field_and_potential(shape, &p);
                let (e_a, phi_a) = analytic.field_and_potential(shape, &p);
                assert_relative_eq!(phi_n, phi_a, max_relative = 1e-5);
                assert_relative_eq!((e_n - e_a).norm() / e_a.norm(), 0.0, epsilon = 1e-4);
            }
        }
    }
}
