use crate::core::traits::Real;
use crate::integrator::BoundaryIntegrator;
use crate::surface::SurfaceContainer;
use std::marker::PhantomData;
use std::sync::OnceLock;

/// Right-hand side of the collocation system: the boundary value of every
/// target element, repeated over its basis components.
pub struct BoundaryIntegralVector<'a, T> {
    container: &'a SurfaceContainer,
    integrator: &'a dyn BoundaryIntegrator,
    cache: Option<Vec<OnceLock<f64>>>,
    _scalar: PhantomData<T>,
}

impl<'a, T: Real> BoundaryIntegralVector<'a, T> {
    pub fn new(container: &'a SurfaceContainer, integrator: &'a dyn BoundaryIntegrator, cache: bool) -> Self {
        let cache = cache.then(|| (0..container.dimension()).map(|_| OnceLock::new()).collect());
        BoundaryIntegralVector { container, integrator, cache, _scalar: PhantomData }
    }

    pub fn dimension(&self) -> usize {
        self.container.dimension()
    }

    pub fn rhs_f64(&self, i: usize) -> f64 {
        let eval = || {
            let (k, _) = self.container.locate(i);
            self.integrator.boundary_value(self.container.element(k))
        };
        match &self.cache {
            Some(cells) => *cells[i].get_or_init(eval),
            None => eval(),
        }
    }

    pub fn rhs(&self, i: usize) -> T {
        T::from_f64_lossy(self.rhs_f64(i))
    }

    pub fn to_vec(&self) -> Vec<T> {
        (0..self.dimension()).map(|i| self.rhs(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::AnalyticIntegrator;
    use crate::surface::{BoundaryElement, Point3, Triangle};

    #[test]
    fn rhs_follows_boundary_conditions() {
        let t = |z: f64| Triangle::from_vertices(Point3::new(0.0, 0.0, z), Point3::new(1.0, 0.0, z), Point3::new(0.0, 1.0, z));
        let c: SurfaceContainer = [BoundaryElement::dirichlet(t(0.0), 3.0), BoundaryElement::neumann(t(1.0), 2.0)]
            .into_iter()
            .collect();
        let integ = AnalyticIntegrator::new();
        let b = BoundaryIntegralVector::<f32>::new(&c, &integ, true);
        assert_eq!(b.to_vec(), vec![3.0f32, 0.0]);
        assert_eq!(b.rhs(0), 3.0);
    }
}
