//! Potential and field of a solved surface charge distribution.

use crate::error::BemError;
use crate::integrator::BoundaryIntegrator;
use crate::surface::{Point3, SurfaceContainer};
use rayon::prelude::*;

/// Sums the contribution of every element at the requested points.
pub struct IntegratingFieldSolver<'a> {
    container: &'a SurfaceContainer,
    integrator: &'a dyn BoundaryIntegrator,
    densities: Vec<f64>,
}

impl<'a> IntegratingFieldSolver<'a> {
    /// Every element must carry a solved charge density.
    pub fn new(container: &'a SurfaceContainer, integrator: &'a dyn BoundaryIntegrator) -> Result<Self, BemError> {
        let densities = container
            .iter()
            .enumerate()
            .map(|(k, e)| {
                e.charge_density()
                    .ok_or_else(|| BemError::InvalidConfig(format!("element {k} has no solved charge density")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(IntegratingFieldSolver { container, integrator, densities })
    }

    pub fn potential(&self, point: &Point3) -> f64 {
        self.container
            .elements()
            .par_iter()
            .zip(&self.densities)
            .map(|(e, &sigma)| sigma * self.integrator.potential(&e.shape, point))
            .sum()
    }

    pub fn electric_field(&self, point: &Point3) -> Point3 {
        self.container
            .elements()
            .par_iter()
            .zip(&self.densities)
            .map(|(e, &sigma)| self.integrator.electric_field(&e.shape, point) * sigma)
            .reduce(Point3::zeros, |a, b| a + b)
    }

    pub fn field_and_potential(&self, point: &Point3) -> (Point3, f64) {
        self.container
            .elements()
            .par_iter()
            .zip(&self.densities)
            .map(|(e, &sigma)| {
                let (f, p) = self.integrator.field_and_potential(&e.shape, point);
                (f * sigma, p * sigma)
            })
            .reduce(|| (Point3::zeros(), 0.0), |a, b| (a.0 + b.0, a.1 + b.1))
    }

    /// Potentials at many points, parallel over the points.
    pub fn potentials(&self, points: &[Point3]) -> Vec<f64> {
        points.par_iter().map(|p| self.serial_potential(p)).collect()
    }

    pub fn electric_fields(&self, points: &[Point3]) -> Vec<Point3> {
        points
            .par_iter()
            .map(|p| {
                self.container
                    .iter()
                    .zip(&self.densities)
                    .map(|(e, &sigma)| self.integrator.electric_field(&e.shape, p) * sigma)
                    .fold(Point3::zeros(), |a, b| a + b)
            })
            .collect()
    }

    fn serial_potential(&self, point: &Point3) -> f64 {
        self.container
            .iter()
            .zip(&self.densities)
            .map(|(e, &sigma)| sigma * self.integrator.potential(&e.shape, point))
            .sum()
    }
}
