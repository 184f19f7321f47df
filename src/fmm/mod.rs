//! Fast multipole approximation of the influence operator's product.
//!
//! Elements are sorted into a uniform-depth octree by centroid. Element
//! charge is carried by quadrature sub-charges, gathered into multipoles at
//! the leaves (P2M), merged upwards (M2M), translated between well separated
//! boxes (M2L), pushed down (L2L) and evaluated at the collocation points
//! (L2P). Pairs of elements in neighbouring leaves are exact: their entries
//! are evaluated once into a sparse near-field matrix.
//!
//! Single entries are never approximated; [`FmmOperator::entry`] asks the
//! wrapped matrix.

pub mod expansion;
pub mod tree;

pub use expansion::ExpansionBasis;
pub use tree::Octree;

use crate::config::MultipoleOptions;
use crate::core::traits::{InfluenceOperator, MatVec, Real};
use crate::error::BemError;
use crate::integrator::quadrature::polygon_quadrature;
use crate::integrator::{COULOMB, collocation_point};
use crate::matrix::CsrMatrix;
use crate::operator::BoundaryIntegralMatrix;
use crate::surface::{BoundaryCondition, Point3, Shape};
use faer::sparse::Triplet;
use log::{debug, info};
use rayon::prelude::*;
use std::ops::Range;

/// Refinement levels of the sub-charges standing in for an element.
const SOURCE_LEVELS: usize = 2;

struct Target {
    point: Point3,
    /// Normal of a Neumann row, which measures the field instead of the potential.
    normal: Option<Point3>,
}

pub struct FmmOperator<'a, T> {
    exact: &'a BoundaryIntegralMatrix<'a, T>,
    basis: ExpansionBasis,
    tree: Octree,
    near: CsrMatrix,
    sources: Vec<Vec<(Point3, f64)>>,
    targets: Vec<Target>,
    /// Leaf of every element.
    leaf_of: Vec<usize>,
    interactions: Vec<Vec<Vec<usize>>>,
}

impl<'a, T: Real> FmmOperator<'a, T> {
    pub fn new(exact: &'a BoundaryIntegralMatrix<'a, T>, options: &MultipoleOptions) -> Result<Self, BemError> {
        let container = exact.container();
        if container.dimension() != container.len() {
            return Err(BemError::InvalidConfig("multipole acceleration needs one unknown per element".into()));
        }
        if let Some(k) = container.iter().position(|e| matches!(e.shape, Shape::ConicSection(_))) {
            return Err(BemError::InvalidConfig(format!(
                "multipole acceleration does not support conic sections (element {k})"
            )));
        }
        let centroids: Vec<Point3> = container.iter().map(|e| e.centroid()).collect();
        let tree = Octree::build(&centroids, options.leaf_capacity, options.max_depth, options.neighbor_order)?;
        let basis = ExpansionBasis::new(options.degree);
        let depth = tree.depth();

        let mut leaf_of = vec![0; container.len()];
        for (li, leaf) in tree.leaves().iter().enumerate() {
            for &e in &leaf.elements {
                leaf_of[e] = li;
            }
        }
        let interactions: Vec<Vec<Vec<usize>>> = (0..=depth)
            .map(|l| (0..tree.level(l).len()).into_par_iter().map(|n| tree.interaction_list(l, n)).collect())
            .collect();

        let sources = container.elements().par_iter().map(|e| polygon_quadrature(&e.shape, SOURCE_LEVELS)).collect();
        let targets = container
            .iter()
            .map(|e| Target {
                point: collocation_point(e),
                normal: match e.boundary {
                    BoundaryCondition::Dirichlet { .. } => None,
                    BoundaryCondition::Neumann { .. } => Some(e.normal()),
                },
            })
            .collect();

        let neighbor_leaves: Vec<Vec<usize>> =
            (0..tree.leaves().len()).into_par_iter().map(|li| tree.neighbors(depth, li)).collect();
        let entries: Vec<Triplet<usize, usize, f64>> = (0..container.len())
            .into_par_iter()
            .flat_map_iter(|i| {
                neighbor_leaves[leaf_of[i]]
                    .iter()
                    .flat_map(|&nl| tree.leaves()[nl].elements.iter())
                    .map(move |&j| Triplet::new(i, j, exact.entry_f64(i, j)))
                    .collect::<Vec<_>>()
            })
            .collect();
        let near = CsrMatrix::from_triplets(container.len(), container.len(), &entries)?;
        info!(
            "fmm: {} elements, depth {depth}, {} leaves, degree {}, {} near-field entries",
            container.len(),
            tree.leaves().len(),
            basis.degree(),
            near.nnz()
        );
        Ok(FmmOperator { exact, basis, tree, near, sources, targets, leaf_of, interactions })
    }

    pub fn tree(&self) -> &Octree {
        &self.tree
    }

    pub fn near_field(&self) -> &CsrMatrix {
        &self.near
    }

    /// Far-field part of `A·x`, in `f64`.
    fn far_field(&self, x: &[f64]) -> Vec<f64> {
        let depth = self.tree.depth();
        let terms = self.basis.len();

        // upward pass
        let mut multipoles: Vec<Vec<Vec<f64>>> = vec![Vec::new(); depth + 1];
        multipoles[depth] = self
            .tree
            .leaves()
            .par_iter()
            .map(|leaf| {
                let mut m = vec![0.0; terms];
                for &e in &leaf.elements {
                    for (p, w) in &self.sources[e] {
                        self.basis.p2m(x[e] * w, &(p - leaf.center), &mut m);
                    }
                }
                m
            })
            .collect();
        for l in (0..depth).rev() {
            let (upper, lower) = multipoles.split_at_mut(l + 1);
            let children = &lower[0];
            let level = self.tree.level(l);
            let child_level = self.tree.level(l + 1);
            upper[l] = level
                .nodes
                .par_iter()
                .map(|node| {
                    let mut m = vec![0.0; terms];
                    for &ch in &node.children {
                        self.basis.m2m(&children[ch], &(child_level.nodes[ch].center - node.center), &mut m);
                    }
                    m
                })
                .collect();
        }

        // translation and downward pass
        let mut locals: Vec<Vec<f64>> = vec![vec![0.0; terms]];
        for l in 1..=depth {
            let level = self.tree.level(l);
            let parent_level = self.tree.level(l - 1);
            let parents = &locals;
            let next: Vec<Vec<f64>> = level
                .nodes
                .par_iter()
                .enumerate()
                .map(|(n, node)| {
                    let mut local = vec![0.0; terms];
                    if let Some(p) = node.parent {
                        self.basis.l2l(&parents[p], &(node.center - parent_level.nodes[p].center), &mut local);
                    }
                    for &s in &self.interactions[l][n] {
                        self.basis.m2l(&multipoles[l][s], &(node.center - level.nodes[s].center), &mut local);
                    }
                    local
                })
                .collect();
            locals = next;
        }

        let leaves = self.tree.leaves();
        self.targets
            .par_iter()
            .enumerate()
            .map(|(i, t)| {
                let leaf = &leaves[self.leaf_of[i]];
                let (phi, grad) = self.basis.l2p(&locals[self.leaf_of[i]], &(t.point - leaf.center));
                match &t.normal {
                    None => COULOMB * phi,
                    Some(n) => -COULOMB * grad.dot(n),
                }
            })
            .collect()
    }

    /// `A·x` in `f64`.
    pub fn apply_f64(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.targets.len(), "input vector has incorrect length");
        let mut y = self.far_field(x);
        let mut near = vec![0.0; y.len()];
        self.near.spmv_parallel(x, &mut near);
        y.iter_mut().zip(&near).for_each(|(yi, ni)| *yi += ni);
        debug!("fmm matvec over {} unknowns", y.len());
        y
    }
}

impl<T: Real> MatVec<[T]> for FmmOperator<'_, T> {
    fn matvec(&self, x: &[T], y: &mut [T]) {
        assert_eq!(y.len(), self.targets.len(), "output vector has incorrect length");
        let x64: Vec<f64> = x.iter().map(|v| v.to_f64_lossy()).collect();
        for (yi, v) in y.iter_mut().zip(self.apply_f64(&x64)) {
            *yi = T::from_f64_lossy(v);
        }
    }
}

impl<T: Real> InfluenceOperator<T> for FmmOperator<'_, T> {
    fn dimension(&self) -> usize {
        self.targets.len()
    }

    fn entry(&self, i: usize, j: usize) -> T {
        self.exact.entry(i, j)
    }

    fn entry_f64(&self, i: usize, j: usize) -> f64 {
        self.exact.entry_f64(i, j)
    }

    fn matvec_rows(&self, rows: Range<usize>, x: &[T], y: &mut [T]) {
        let mut full = vec![T::zero(); self.targets.len()];
        self.matvec(x, &mut full);
        y.copy_from_slice(&full[rows]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::AnalyticIntegrator;
    use crate::surface::generators::icosphere;
    use crate::surface::{BoundaryElement, SurfaceContainer, Triangle};
    use crate::utils::ResidualNorm;

    fn sphere() -> SurfaceContainer {
        // 320 triangles
        icosphere(1.0, 2, Point3::zeros()).into_iter().map(|t| BoundaryElement::dirichlet(t, 1.0)).collect()
    }

    #[test]
    fn error_decreases_with_degree() {
        let container = sphere();
        let integrator = AnalyticIntegrator::new();
        let exact = BoundaryIntegralMatrix::<f64>::new(&container, &integrator, false);
        let x: Vec<f64> = (0..container.len()).map(|i| 1.0 + (i as f64 * 0.37).sin()).collect();
        let mut reference = vec![0.0; x.len()];
        exact.matvec(&x, &mut reference);
        let scale = ResidualNorm::Euclidean.measure(&reference);

        let mut last = f64::INFINITY;
        for degree in [2, 4, 6, 8] {
            let options = MultipoleOptions { degree, max_depth: 4, neighbor_order: 1, leaf_capacity: 4 };
            let fmm = FmmOperator::new(&exact, &options).unwrap();
            assert!(fmm.tree().depth() >= 2, "tree too shallow to exercise translations");
            let y = fmm.apply_f64(&x);
            let diff: Vec<f64> = y.iter().zip(&reference).map(|(a, b)| a - b).collect();
            let err = ResidualNorm::Euclidean.measure(&diff) / scale;
            assert!(err < last, "degree {degree}: error {err} did not decrease from {last}");
            last = err;
        }
        assert!(last < 1e-3, "error at degree 8 is {last}");
    }

    #[test]
    fn entries_are_exact() {
        let container = sphere();
        let integrator = AnalyticIntegrator::new();
        let exact = BoundaryIntegralMatrix::<f64>::new(&container, &integrator, false);
        let fmm = FmmOperator::new(&exact, &MultipoleOptions::default()).unwrap();
        assert_eq!(fmm.entry(3, 200), exact.entry(3, 200));
        assert_eq!(fmm.dimension(), 320);
    }

    #[test]
    fn near_field_holds_exact_neighbour_entries() {
        let container = sphere();
        let integrator = AnalyticIntegrator::new();
        let exact = BoundaryIntegralMatrix::<f64>::new(&container, &integrator, false);
        let options = MultipoleOptions { degree: 4, max_depth: 4, neighbor_order: 1, leaf_capacity: 4 };
        let fmm = FmmOperator::new(&exact, &options).unwrap();
        let near = fmm.near_field().as_faer();
        assert_eq!((near.nrows(), near.ncols()), (320, 320));
        let symbolic = near.symbolic();
        for i in [0, 17, 319] {
            let range = symbolic.row_range(i);
            let cols = &symbolic.col_idx()[range.clone()];
            assert!(cols.contains(&i), "row {i} misses its own element");
            assert!(cols.windows(2).all(|w| w[0] < w[1]));
            for (&j, &v) in cols.iter().zip(&near.val()[range]) {
                assert_eq!(v, exact.entry_f64(i, j));
            }
        }
    }

    #[test]
    fn conic_sections_are_rejected() {
        let mut container: SurfaceContainer = crate::surface::generators::sphere_strips(1.0, 8)
            .into_iter()
            .map(|c| BoundaryElement::dirichlet(c, 1.0))
            .collect();
        container.push(BoundaryElement::dirichlet(
            Triangle::from_vertices(Point3::zeros(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)),
            1.0,
        ));
        let integrator = AnalyticIntegrator::new();
        let exact = BoundaryIntegralMatrix::<f64>::new(&container, &integrator, false);
        assert!(matches!(FmmOperator::new(&exact, &MultipoleOptions::default()), Err(BemError::InvalidConfig(_))));
    }
}
