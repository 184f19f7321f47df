//! Ordered collection of boundary elements.
//!
//! The insertion order fixes the indexing of the linear system: element `k`
//! owns the global indices `offsets[k]..offsets[k + 1]`.

use super::element::BoundaryElement;
use crate::error::BemError;
use crate::utils::Fingerprint;
use log::debug;
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct SurfaceContainer {
    elements: Vec<BoundaryElement>,
    offsets: Vec<usize>,
}

impl SurfaceContainer {
    pub fn new() -> Self {
        SurfaceContainer { elements: Vec::new(), offsets: vec![0] }
    }

    pub fn push(&mut self, element: BoundaryElement) {
        if self.offsets.is_empty() {
            self.offsets.push(0);
        }
        let end = self.dimension() + element.basis().dimension();
        self.elements.push(element);
        self.offsets.push(end);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of unknowns: the sum of all basis dimensions.
    pub fn dimension(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    pub fn elements(&self) -> &[BoundaryElement] {
        &self.elements
    }

    pub fn element(&self, k: usize) -> &BoundaryElement {
        &self.elements[k]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BoundaryElement> {
        self.elements.iter()
    }

    /// Maps a global unknown index to (element index, basis component).
    pub fn locate(&self, index: usize) -> (usize, usize) {
        assert!(index < self.dimension(), "index {index} out of range for dimension {}", self.dimension());
        let k = self.offsets.partition_point(|&o| o <= index) - 1;
        (k, index - self.offsets[k])
    }

    /// Content hash of the geometry and boundary conditions.
    pub fn fingerprint(&self) -> u64 {
        let mut fp = Fingerprint::new();
        fp.u64(self.elements.len() as u64);
        for e in &self.elements {
            e.hash_into(&mut fp);
        }
        fp.finish()
    }

    /// Rejects collections that would make the influence matrix singular.
    pub fn validate(&self) -> Result<(), BemError> {
        if self.elements.is_empty() {
            return Err(BemError::DegenerateGeometry("empty surface container".into()));
        }
        for (k, e) in self.elements.iter().enumerate() {
            e.check().map_err(|err| match err {
                BemError::DegenerateGeometry(msg) => BemError::DegenerateGeometry(format!("element {k}: {msg}")),
                other => other,
            })?;
        }
        // coincident collocation points give two identical rows
        let scale = self
            .elements
            .iter()
            .map(|e| e.shape.size())
            .fold(f64::INFINITY, f64::min);
        let tol = 1e-9 * scale;
        let cell = |v: f64| (v / tol).floor() as i64;
        let mut grid: HashMap<[i64; 3], Vec<usize>> = HashMap::with_capacity(self.elements.len());
        for (k, e) in self.elements.iter().enumerate() {
            let c = e.centroid();
            let key = [cell(c.x), cell(c.y), cell(c.z)];
            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        let near = [key[0].saturating_add(dx), key[1].saturating_add(dy), key[2].saturating_add(dz)];
                        let Some(bucket) = grid.get(&near) else { continue };
                        if let Some(&j) = bucket.iter().find(|&&j| (self.elements[j].centroid() - c).norm() <= tol) {
                            return Err(BemError::DegenerateGeometry(format!(
                                "elements {j} and {k} share a collocation point"
                            )));
                        }
                    }
                }
            }
            grid.entry(key).or_default().push(k);
        }
        debug!("validated {} elements, dimension {}", self.len(), self.dimension());
        Ok(())
    }

    /// Writes a solution vector back into the element bases.
    pub fn write_solution(&mut self, x: &[f64], iteration: usize) {
        assert_eq!(x.len(), self.dimension(), "solution length does not match dimension");
        for (k, e) in self.elements.iter_mut().enumerate() {
            let range = self.offsets[k]..self.offsets[k + 1];
            e.basis_mut().commit(&x[range], iteration);
        }
    }

    /// Σ σ·A over all elements with a solved basis.
    pub fn total_charge(&self) -> f64 {
        self.elements
            .iter()
            .filter_map(|e| e.charge_density().map(|s| s * e.area()))
            .sum()
    }
}

impl FromIterator<BoundaryElement> for SurfaceContainer {
    fn from_iter<I: IntoIterator<Item = BoundaryElement>>(iter: I) -> Self {
        let mut c = SurfaceContainer::new();
        c.extend(iter);
        c
    }
}

impl Extend<BoundaryElement> for SurfaceContainer {
    fn extend<I: IntoIterator<Item = BoundaryElement>>(&mut self, iter: I) {
        for e in iter {
            self.push(e);
        }
    }
}

impl<'a> IntoIterator for &'a SurfaceContainer {
    type Item = &'a BoundaryElement;
    type IntoIter = std::slice::Iter<'a, BoundaryElement>;
    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
