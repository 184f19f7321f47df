//! Axisymmetric strips: closed-form ring kernel integrated along the generator.
//!
//! A ring of radius `a` at height `z'` carrying charge `dq` produces, at
//! cylindrical coordinates `(r, z)`,
//!
//! ```text
//! φ   = dq/(4πε0) · (2/π) K(m) / S
//! E_z = dq/(4πε0) · (2/π) (z - z') E(m) / (S D²)
//! E_r = dq/(4πε0) · 1/(π r S) · [K(m) + E(m) (r² - a² - (z - z')²) / D²]
//! ```
//!
//! with `S² = (r + a)² + (z - z')²`, `D² = (r - a)² + (z - z')²` and
//! `m = 4ar / S²`. The remaining line integral is log-singular when the
//! evaluation point lies on the strip, so it is split at the closest point
//! and graded geometrically towards it.

use super::COULOMB;
use super::quadrature::gauss_on;
use crate::surface::{ConicSection, Point3};
use std::f64::consts::PI;

const GRADED_LEVELS: usize = 14;
const PANEL_ORDER: usize = 8;

/// Complete elliptic integrals K(m) and E(m) (parameter convention) by the
/// arithmetic–geometric mean.
pub fn elliptic_ke(m: f64) -> (f64, f64) {
    let m = m.clamp(0.0, 1.0 - 1e-16);
    let mut a = 1.0;
    let mut b = (1.0 - m).sqrt();
    let mut c = m.sqrt();
    let mut pow = 0.5;
    let mut sum = pow * c * c;
    for _ in 0..64 {
        if c.abs() < 1e-17 {
            break;
        }
        let an = 0.5 * (a + b);
        c = 0.5 * (a - b);
        b = (a * b).sqrt();
        a = an;
        pow *= 2.0;
        sum += pow * c * c;
    }
    let k = PI / (2.0 * a);
    (k, k * (1.0 - sum))
}

fn cylindrical(point: &Point3) -> (f64, f64) {
    ((point.x * point.x + point.y * point.y).sqrt(), point.z)
}

/// Integrates `f(s)` over the generator parameter `s ∈ [0, 1]`, refining
/// towards `s_star` when the point is close to the strip.
fn integrate_generator<F: FnMut(f64) -> f64>(mut f: F, s_star: Option<f64>) -> f64 {
    let mut total = 0.0;
    match s_star {
        None => {
            for p in 0..4 {
                let (a, b) = (p as f64 / 4.0, (p + 1) as f64 / 4.0);
                total += gauss_on(PANEL_ORDER, a, b).map(|(s, w)| w * f(s)).sum::<f64>();
            }
        }
        Some(s0) => {
            for (end, len) in [(0.0, s0), (1.0, 1.0 - s0)] {
                if len <= 0.0 {
                    continue;
                }
                let dir = if end > s0 { 1.0 } else { -1.0 };
                let mut outer = len;
                for _ in 0..GRADED_LEVELS {
                    let inner = 0.5 * outer;
                    let (a, b) = (s0 + dir * inner, s0 + dir * outer);
                    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                    total += gauss_on(PANEL_ORDER, lo, hi).map(|(s, w)| w * f(s)).sum::<f64>();
                    outer = inner;
                }
            }
        }
    }
    total
}

/// Closest generator parameter when `(r, z)` is within one strip length of it.
fn singular_parameter(c: &ConicSection, r: f64, z: f64) -> Option<f64> {
    let (dr, dz) = (c.r1 - c.r0, c.z1 - c.z0);
    let l2 = dr * dr + dz * dz;
    let s = (((r - c.r0) * dr + (z - c.z0) * dz) / l2).clamp(0.0, 1.0);
    let (pr, pz) = (c.r0 + s * dr, c.z0 + s * dz);
    let d2 = (r - pr).powi(2) + (z - pz).powi(2);
    (d2 < l2).then_some(s)
}

/// Potential of a unit-density strip.
pub fn potential(c: &ConicSection, point: &Point3) -> f64 {
    let (r, z) = cylindrical(point);
    let len = c.length();
    let integrand = |s: f64| {
        let a = c.r0 + s * (c.r1 - c.r0);
        let zp = c.z0 + s * (c.z1 - c.z0);
        let dz = z - zp;
        let s2 = (r + a).powi(2) + dz * dz;
        if s2 <= 0.0 {
            return 0.0;
        }
        let sq = s2.sqrt();
        let (k, _) = elliptic_ke(4.0 * a * r / s2);
        4.0 * a * k / sq
    };
    COULOMB * len * integrate_generator(integrand, singular_parameter(c, r, z))
}

/// Field of a unit-density strip.
pub fn electric_field(c: &ConicSection, point: &Point3) -> Point3 {
    let (r, z) = cylindrical(point);
    let len = c.length();
    let s_star = singular_parameter(c, r, z);
    let components = |radial: bool| {
        move |s: f64| {
            let a = c.r0 + s * (c.r1 - c.r0);
            let zp = c.z0 + s * (c.z1 - c.z0);
            let dz = z - zp;
            let s2 = (r + a).powi(2) + dz * dz;
            let d2 = (r - a).powi(2) + dz * dz;
            if s2 <= 0.0 || d2 <= 0.0 {
                return 0.0;
            }
            let sq = s2.sqrt();
            let (k, e) = elliptic_ke(4.0 * a * r / s2);
            if radial {
                if r < 1e-14 {
                    0.0
                } else {
                    2.0 * a / (r * sq) * (k + e * (r * r - a * a - dz * dz) / d2)
                }
            } else {
                4.0 * a * dz * e / (sq * d2)
            }
        }
    };
    let er = COULOMB * len * integrate_generator(components(true), s_star);
    let ez = COULOMB * len * integrate_generator(components(false), s_star);
    if r < 1e-14 {
        Point3::new(0.0, 0.0, ez)
    } else {
        Point3::new(er * point.x / r, er * point.y / r, ez)
    }
}
