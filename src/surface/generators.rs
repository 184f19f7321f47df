//! Reference geometries with known electrostatic solutions.
//!
//! These are not a mesh importer: they build the closed surfaces used to
//! check the solvers against closed-form results.

use super::container::SurfaceContainer;
use super::element::BoundaryElement;
use super::shape::{ConicSection, Point3, Triangle};
use crate::integrator::EPS0;
use std::collections::HashMap;
use std::f64::consts::PI;

/// Triangulated sphere obtained by subdividing an icosahedron.
///
/// `subdivisions = k` yields `20·4^k` triangles with outward normals.
pub fn icosphere(radius: f64, subdivisions: usize, center: Point3) -> Vec<Triangle> {
    let t = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let mut vertices: Vec<Point3> = [
        (-1.0, t, 0.0),
        (1.0, t, 0.0),
        (-1.0, -t, 0.0),
        (1.0, -t, 0.0),
        (0.0, -1.0, t),
        (0.0, 1.0, t),
        (0.0, -1.0, -t),
        (0.0, 1.0, -t),
        (t, 0.0, -1.0),
        (t, 0.0, 1.0),
        (-t, 0.0, -1.0),
        (-t, 0.0, 1.0),
    ]
    .iter()
    .map(|&(x, y, z)| Point3::new(x, y, z).normalize())
    .collect();
    let mut faces: Vec<[usize; 3]> = vec![
        [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
        [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
        [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
        [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Point3>| -> usize {
            let key = (a.min(b), a.max(b));
            *midpoints.entry(key).or_insert_with(|| {
                vertices.push(((vertices[a] + vertices[b]) * 0.5).normalize());
                vertices.len() - 1
            })
        };
        let mut next = Vec::with_capacity(faces.len() * 4);
        for &[a, b, c] in &faces {
            let ab = midpoint(a, b, &mut vertices);
            let bc = midpoint(b, c, &mut vertices);
            let ca = midpoint(c, a, &mut vertices);
            next.extend_from_slice(&[[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
        }
        faces = next;
    }

    faces
        .iter()
        .map(|&[a, b, c]| {
            let (pa, pb, pc) = (vertices[a], vertices[b], vertices[c]);
            let outward = (pb - pa).cross(&(pc - pa)).dot(&(pa + pb + pc)) > 0.0;
            let (pb, pc) = if outward { (pb, pc) } else { (pc, pb) };
            Triangle::from_vertices(center + pa * radius, center + pb * radius, center + pc * radius)
        })
        .collect()
}

/// Axisymmetric sphere cut into `count` strips of equal polar angle,
/// ordered from the south pole to the north pole (outward normals).
pub fn sphere_strips(radius: f64, count: usize) -> Vec<ConicSection> {
    (0..count)
        .map(|k| {
            let t0 = -PI / 2.0 + PI * k as f64 / count as f64;
            let t1 = -PI / 2.0 + PI * (k + 1) as f64 / count as f64;
            ConicSection::new(
                (radius * t0.cos()).max(0.0),
                radius * t0.sin(),
                (radius * t1.cos()).max(0.0),
                radius * t1.sin(),
            )
        })
        .collect()
}

/// Three concentric spheres: an inner conductor at `potential`, a dielectric
/// interface, and a grounded outer conductor. The gaps are filled with
/// dielectrics of relative permittivity `eps_inner` and `eps_outer`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SphericalCapacitor {
    pub radii: [f64; 3],
    pub eps_inner: f64,
    pub eps_outer: f64,
    pub potential: f64,
}

impl Default for SphericalCapacitor {
    fn default() -> Self {
        SphericalCapacitor { radii: [1.0, 2.0, 3.0], eps_inner: 2.0, eps_outer: 3.0, potential: 1.0 }
    }
}

impl SphericalCapacitor {
    /// Tessellates all three spheres with `20·4^k` triangles each.
    pub fn triangulated(&self, subdivisions: usize) -> SurfaceContainer {
        let [r1, r2, r3] = self.radii;
        let origin = Point3::zeros();
        let mut c = SurfaceContainer::new();
        c.extend(icosphere(r1, subdivisions, origin).into_iter().map(|t| BoundaryElement::dirichlet(t, self.potential)));
        c.extend(icosphere(r2, subdivisions, origin).into_iter().map(|t| BoundaryElement::neumann(t, self.eps_inner / self.eps_outer)));
        c.extend(icosphere(r3, subdivisions, origin).into_iter().map(|t| BoundaryElement::dirichlet(t, 0.0)));
        c
    }

    /// Discretises all three spheres with `strips` conic sections each.
    pub fn axisymmetric(&self, strips: usize) -> SurfaceContainer {
        let [r1, r2, r3] = self.radii;
        let mut c = SurfaceContainer::new();
        c.extend(sphere_strips(r1, strips).into_iter().map(|s| BoundaryElement::dirichlet(s, self.potential)));
        c.extend(sphere_strips(r2, strips).into_iter().map(|s| BoundaryElement::neumann(s, self.eps_inner / self.eps_outer)));
        c.extend(sphere_strips(r3, strips).into_iter().map(|s| BoundaryElement::dirichlet(s, 0.0)));
        c
    }

    /// Free charge on the inner conductor.
    pub fn free_charge(&self) -> f64 {
        let [r1, r2, r3] = self.radii;
        let (e1, e2) = (self.eps_inner, self.eps_outer);
        self.potential * 4.0 * PI
            / (-1.0 / (EPS0 * e2 * r3) + 1.0 / (EPS0 * e2 * r2) - 1.0 / (EPS0 * e1 * r2) + 1.0 / (EPS0 * e1 * r1))
    }

    /// Total (free + bound) charge carried by each of the three spheres.
    pub fn shell_charges(&self) -> [f64; 3] {
        let q = self.free_charge();
        let qb1 = -(self.eps_inner - 1.0) * q / self.eps_inner;
        let qb2 = -qb1;
        let qb3 = -(self.eps_outer - 1.0) * q / self.eps_outer;
        let qb4 = -qb3;
        [q + qb1, qb2 + qb3, qb4 - q]
    }

    pub fn potential_at(&self, r: f64) -> f64 {
        let [r1, r2, r3] = self.radii;
        let q = self.free_charge();
        let k1 = q / (4.0 * PI * EPS0 * self.eps_inner);
        let k2 = q / (4.0 * PI * EPS0 * self.eps_outer);
        if r < r1 {
            self.potential
        } else if r < r2 {
            k2 * (1.0 / r2 - 1.0 / r3) + k1 * (1.0 / r - 1.0 / r2)
        } else if r < r3 {
            k2 * (1.0 / r - 1.0 / r3)
        } else {
            0.0
        }
    }

    /// Radial field magnitude.
    pub fn field_at(&self, r: f64) -> f64 {
        let [r1, r2, r3] = self.radii;
        let q = self.free_charge();
        if r < r1 || r > r3 {
            0.0
        } else if r < r2 {
            q / (4.0 * PI * EPS0 * self.eps_inner * r * r)
        } else {
            q / (4.0 * PI * EPS0 * self.eps_outer * r * r)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn icosphere_counts_and_orientation() {
        let tris = icosphere(2.0, 2, Point3::zeros());
        assert_eq!(tris.len(), 320);
        for t in &tris {
            assert!(t.normal().dot(&t.centroid()) > 0.0);
        }
        let area: f64 = tris.iter().map(|t| t.area()).sum();
        assert_relative_eq!(area, 4.0 * PI * 4.0, max_relative = 0.02);
    }

    #[test]
    fn strips_cover_the_sphere() {
        let strips = sphere_strips(1.0, 40);
        let area: f64 = strips.iter().map(|s| s.area()).sum();
        assert_relative_eq!(area, 4.0 * PI, max_relative = 1e-3);
        assert!(strips.iter().all(|s| s.normal().dot(&s.centroid()) > 0.0));
    }

    #[test]
    fn capacitor_charges_balance() {
        let cap = SphericalCapacitor::default();
        let q = cap.shell_charges();
        assert_relative_eq!(q[0] + q[1] + q[2], 0.0, epsilon = 1e-12 * q[0].abs());
        assert_relative_eq!(cap.potential_at(1.0), 1.0, max_relative = 1e-12);
        assert_relative_eq!(cap.potential_at(2.999_999_999), 0.0, epsilon = 1e-8);
    }
}
