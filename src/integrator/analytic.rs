//! Closed-form kernels for uniformly charged elements.
//!
//! Flat polygons use the edge decomposition of Wilton et al.: for an
//! evaluation point at height `h` above the element plane, every edge
//! contributes a logarithmic term and a solid-angle term,
//!
//! ```text
//! ∫ 1/R dS  = Σ t0·f − |h|·Σ β
//! ∇∫ 1/R dS = −( n·sgn(h)·Σ β + Σ m·f )
//! ```
//!
//! where `m` is the in-plane outward edge normal, `t0` the signed distance
//! from the projected point to the edge line, `f = ln((R⁺ + l⁺)/(R⁻ + l⁻))`
//! and `β` the angle the edge subtends. Line segments are thin wires
//! carrying a line charge on their axis.

use super::{BoundaryIntegrator, COULOMB, conic};
use crate::surface::{LineSegment, Point3, Shape};

const TINY: f64 = 1e-300;

#[derive(Clone, Copy, Debug, Default)]
pub struct AnalyticIntegrator;

impl AnalyticIntegrator {
    pub fn new() -> Self {
        AnalyticIntegrator
    }
}

struct EdgeTerms {
    potential: f64,
    beta_sum: f64,
    tangential: Point3,
    h: f64,
    normal: Point3,
}

fn polygon_terms(vertices: &[Point3], normal: Point3, p: &Point3) -> EdgeTerms {
    let scale = vertices.iter().map(|v| (v - vertices[0]).norm()).fold(0.0, f64::max);
    let mut h = (p - vertices[0]).dot(&normal);
    // in-plane points take the principal value of the normal field
    if h.abs() < 1e-12 * scale {
        h = 0.0;
    }
    let rho = p - normal * h;
    let habs = h.abs();
    let mut potential = 0.0;
    let mut beta_sum = 0.0;
    let mut tangential = Point3::zeros();
    for i in 0..vertices.len() {
        let a = vertices[i];
        let b = vertices[(i + 1) % vertices.len()];
        let edge = b - a;
        let len = edge.norm();
        let u = edge / len;
        let m = u.cross(&normal);
        let t0 = (a - rho).dot(&m);
        let l_minus = (a - rho).dot(&u);
        let l_plus = (b - rho).dot(&u);
        let r0_sq = t0 * t0 + h * h;
        let r_minus = (p - a).norm();
        let r_plus = (p - b).norm();

        let f = if l_minus < 0.0 && l_plus < 0.0 {
            let (num, den) = (r_minus - l_minus, r_plus - l_plus);
            if num > TINY && den > TINY { (num / den).ln() } else { 0.0 }
        } else {
            let (num, den) = (r_plus + l_plus, r_minus + l_minus);
            if num > TINY && den > TINY { (num / den).ln() } else { 0.0 }
        };
        let beta = (t0 * l_plus).atan2(r0_sq + habs * r_plus) - (t0 * l_minus).atan2(r0_sq + habs * r_minus);

        potential += t0 * f;
        beta_sum += beta;
        tangential += m * f;
    }
    potential -= habs * beta_sum;
    EdgeTerms { potential, beta_sum, tangential, h, normal }
}

fn polygon_field(terms: &EdgeTerms) -> Point3 {
    let sgn = if terms.h > 0.0 {
        1.0
    } else if terms.h < 0.0 {
        -1.0
    } else {
        0.0
    };
    (terms.normal * (sgn * terms.beta_sum) + terms.tangential) * COULOMB
}

/// Potential and field of a wire with line density `π·d` per unit surface density.
pub(crate) fn wire_field_and_potential(l: &LineSegment, p: &Point3) -> (Point3, f64) {
    let len = l.length();
    let u = l.axis();
    let rel = p - l.p0;
    let z = rel.dot(&u);
    let radial = rel - u * z;
    let rho = radial.norm();
    let r1 = rel.norm();
    let r2 = (p - l.p1).norm();
    let lambda = l.line_density() * COULOMB;

    let den = r1 + r2 - len;
    let potential = if den > TINY { lambda * ((r1 + r2 + len) / den).ln() } else { f64::INFINITY };

    let e_par = lambda * (1.0 / r2.max(TINY) - 1.0 / r1.max(TINY));
    let mut field = u * e_par;
    if rho > 1e-14 * len {
        let e_rho = lambda / rho * (z / r1 + (len - z) / r2);
        field += radial / rho * e_rho;
    }
    (field, potential)
}

impl BoundaryIntegrator for AnalyticIntegrator {
    fn name(&self) -> &'static str {
        "analytic"
    }

    fn potential(&self, source: &Shape, point: &Point3) -> f64 {
        match source {
            Shape::Triangle(_) | Shape::Rectangle(_) => {
                let vertices = source.polygon().unwrap_or_default();
                COULOMB * polygon_terms(&vertices, source.normal(), point).potential
            }
            Shape::LineSegment(l) => wire_field_and_potential(l, point).1,
            Shape::ConicSection(c) => conic::potential(c, point),
        }
    }

    fn electric_field(&self, source: &Shape, point: &Point3) -> Point3 {
        match source {
            Shape::Triangle(_) | Shape::Rectangle(_) => {
                let vertices = source.polygon().unwrap_or_default();
                polygon_field(&polygon_terms(&vertices, source.normal(), point))
            }
            Shape::LineSegment(l) => wire_field_and_potential(l, point).0,
            Shape::ConicSection(c) => conic::electric_field(c, point),
        }
    }

    fn field_and_potential(&self, source: &Shape, point: &Point3) -> (Point3, f64) {
        match source {
            Shape::Triangle(_) | Shape::Rectangle(_) => {
                let vertices = source.polygon().unwrap_or_default();
                let terms = polygon_terms(&vertices, source.normal(), point);
                (polygon_field(&terms), COULOMB * terms.potential)
            }
            Shape::LineSegment(l) => wire_field_and_potential(l, point),
            Shape::ConicSection(c) => (conic::electric_field(c, point), conic::potential(c, point)),
        }
    }
}
