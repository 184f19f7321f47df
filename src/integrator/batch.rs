//! Integrator that hands far-field blocks to a compute device.
//!
//! Pairs at least `far_ratio` element sizes apart are expanded into
//! quadrature clouds and shipped to the device in one batch; everything
//! else (near pairs, self terms, conic sections) goes through the wrapped
//! host integrator.

use super::quadrature::polygon_quadrature;
use super::{BoundaryIntegrator, COULOMB, collocation_point};
use crate::accelerator::{ComputeDevice, KernelMode, SourceCloud, TargetSet};
use crate::error::BemError;
use crate::surface::{BasisRole, BoundaryElement, Point3, Shape};
use log::debug;
use rayon::prelude::*;
use std::sync::Arc;

/// Quadrature refinement used for device sources.
const DEVICE_LEVELS: usize = 2;

pub struct BatchIntegrator {
    device: Arc<dyn ComputeDevice>,
    inner: Box<dyn BoundaryIntegrator>,
    /// Minimum distance, in source sizes, for a pair to go to the device.
    pub far_ratio: f64,
}

impl BatchIntegrator {
    pub fn new(device: Arc<dyn ComputeDevice>, inner: Box<dyn BoundaryIntegrator>) -> Self {
        BatchIntegrator { device, inner, far_ratio: 2.0 }
    }

    pub fn device_name(&self) -> String {
        self.device.name()
    }

    fn is_far(&self, source: &BoundaryElement, target: &BoundaryElement) -> bool {
        if matches!(source.shape, Shape::ConicSection(_)) {
            return false;
        }
        let d = (collocation_point(target) - source.centroid()).norm();
        d >= self.far_ratio * source.shape.size()
    }
}

impl BoundaryIntegrator for BatchIntegrator {
    fn name(&self) -> &'static str {
        "batch"
    }

    fn potential(&self, source: &Shape, point: &Point3) -> f64 {
        self.inner.potential(source, point)
    }

    fn electric_field(&self, source: &Shape, point: &Point3) -> Point3 {
        self.inner.electric_field(source, point)
    }

    fn field_and_potential(&self, source: &Shape, point: &Point3) -> (Point3, f64) {
        self.inner.field_and_potential(source, point)
    }

    fn boundary_integral(&self, source: &BoundaryElement, target: &BoundaryElement, coincident: bool) -> f64 {
        self.inner.boundary_integral(source, target, coincident)
    }

    fn prefers_batches(&self) -> bool {
        true
    }

    fn influence_block(&self, elements: &[BoundaryElement], sources: &[usize], targets: &[usize]) -> Result<Vec<f64>, BemError> {
        let ns = sources.len();
        let mut out = vec![0.0; targets.len() * ns];
        if ns == 0 || targets.is_empty() {
            return Ok(out);
        }

        let mut cloud = SourceCloud::new();
        for &s in sources {
            cloud.push(&polygon_quadrature(&elements[s].shape, DEVICE_LEVELS));
        }
        let mut set = TargetSet::default();
        for &t in targets {
            let target = &elements[t];
            let mode = match target.role() {
                BasisRole::Dirichlet => KernelMode::Potential,
                BasisRole::Neumann => KernelMode::NormalField,
            };
            set.push(collocation_point(target), target.normal(), mode);
        }
        let raw = self.device.evaluate(&cloud, &set)?;
        if raw.len() != out.len() {
            return Err(BemError::Accelerator(format!(
                "device returned {} values for a {}x{} block",
                raw.len(),
                targets.len(),
                ns
            )));
        }

        let near = out
            .par_chunks_mut(ns)
            .zip(raw.par_chunks(ns))
            .zip(targets.par_iter())
            .map(|((row, raw_row), &t)| {
                let target = &elements[t];
                let mut near = 0usize;
                for ((v, r), &s) in row.iter_mut().zip(raw_row).zip(sources) {
                    let source = &elements[s];
                    if s != t && self.is_far(source, target) {
                        *v = COULOMB * r;
                    } else {
                        *v = self.inner.boundary_integral(source, target, s == t);
                        near += 1;
                    }
                }
                near
            })
            .sum::<usize>();
        debug!(
            "{}x{} block on {}: {} pairs recomputed on the host",
            targets.len(),
            ns,
            self.device.name(),
            near
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accelerator::HostDevice;
    use crate::integrator::AnalyticIntegrator;
    use crate::surface::generators::icosphere;
    use approx::assert_relative_eq;

    #[test]
    fn block_matches_entrywise_evaluation() {
        let elements: Vec<BoundaryElement> = icosphere(1.0, 1, Point3::zeros())
            .into_iter()
            .enumerate()
            .map(|(k, t)| if k % 3 == 0 { BoundaryElement::neumann(t, 0.5) } else { BoundaryElement::dirichlet(t, 1.0) })
            .collect();
        let batch = BatchIntegrator::new(Arc::new(HostDevice), Box::new(AnalyticIntegrator::new()));
        let analytic = AnalyticIntegrator::new();
        let sources: Vec<usize> = (0..elements.len()).step_by(2).collect();
        let targets: Vec<usize> = (0..elements.len()).collect();
        let block = batch.influence_block(&elements, &sources, &targets).unwrap();
        for (ti, &t) in targets.iter().enumerate() {
            for (si, &s) in sources.iter().enumerate() {
                let exact = analytic.boundary_integral(&elements[s], &elements[t], s == t);
                let got = block[ti * sources.len() + si];
                assert_relative_eq!(got, exact, max_relative = 1e-3, epsilon = 1e-4 * COULOMB);
            }
        }
    }
}
