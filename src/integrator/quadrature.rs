//! Quadrature rules over segments and flat elements.

use crate::surface::{Point3, Shape};
use std::f64::consts::PI;
use std::sync::OnceLock;

/// Gauss–Legendre nodes and weights on [-1, 1], found by Newton iteration
/// on the Legendre recurrence.
pub fn gauss_legendre(order: usize) -> (Vec<f64>, Vec<f64>) {
    assert!(order >= 1, "Gauss-Legendre order must be positive");
    let n = order;
    let mut x = vec![0.0; n];
    let mut w = vec![0.0; n];
    for i in 0..n.div_ceil(2) {
        let mut z = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dp = 0.0;
        for _ in 0..100 {
            let (mut p0, mut p1) = (1.0, 0.0);
            for k in 0..n {
                let p2 = p1;
                p1 = p0;
                p0 = ((2 * k + 1) as f64 * z * p1 - k as f64 * p2) / (k + 1) as f64;
            }
            dp = n as f64 * (z * p0 - p1) / (z * z - 1.0);
            let dz = p0 / dp;
            z -= dz;
            if dz.abs() < 1e-15 {
                break;
            }
        }
        x[i] = -z;
        x[n - 1 - i] = z;
        w[i] = 2.0 / ((1.0 - z * z) * dp * dp);
        w[n - 1 - i] = w[i];
    }
    (x, w)
}

const MAX_CACHED_ORDER: usize = 32;

fn cached_rule(order: usize) -> &'static (Vec<f64>, Vec<f64>) {
    static RULES: OnceLock<Vec<(Vec<f64>, Vec<f64>)>> = OnceLock::new();
    assert!(
        (1..=MAX_CACHED_ORDER).contains(&order),
        "Gauss-Legendre order must be 1..={MAX_CACHED_ORDER}"
    );
    &RULES.get_or_init(|| (1..=MAX_CACHED_ORDER).map(gauss_legendre).collect())[order - 1]
}

/// Gauss–Legendre rule mapped onto [a, b].
pub fn gauss_on(order: usize, a: f64, b: f64) -> impl Iterator<Item = (f64, f64)> {
    let (x, w) = cached_rule(order);
    let half = 0.5 * (b - a);
    let mid = 0.5 * (a + b);
    x.iter().zip(w).map(move |(&xi, &wi)| (mid + half * xi, half * wi))
}

/// Seven point, degree five rule on the reference triangle: (ξ, η, weight),
/// weights summing to one.
pub const TRIANGLE_7: [(f64, f64, f64); 7] = [
    (1.0 / 3.0, 1.0 / 3.0, 0.225),
    (0.101_286_507_323_456_3, 0.101_286_507_323_456_3, 0.125_939_180_544_827_2),
    (0.797_426_985_353_087_3, 0.101_286_507_323_456_3, 0.125_939_180_544_827_2),
    (0.101_286_507_323_456_3, 0.797_426_985_353_087_3, 0.125_939_180_544_827_2),
    (0.470_142_064_105_115_1, 0.470_142_064_105_115_1, 0.132_394_152_788_506_2),
    (0.059_715_871_789_769_8, 0.470_142_064_105_115_1, 0.132_394_152_788_506_2),
    (0.470_142_064_105_115_1, 0.059_715_871_789_769_8, 0.132_394_152_788_506_2),
];

fn triangle_points(v: [Point3; 3], levels: usize, out: &mut Vec<(Point3, f64)>) {
    if levels == 0 {
        let area = 0.5 * (v[1] - v[0]).cross(&(v[2] - v[0])).norm();
        for &(xi, eta, w) in &TRIANGLE_7 {
            out.push((v[0] + (v[1] - v[0]) * xi + (v[2] - v[0]) * eta, w * area));
        }
        return;
    }
    let m01 = (v[0] + v[1]) * 0.5;
    let m12 = (v[1] + v[2]) * 0.5;
    let m20 = (v[2] + v[0]) * 0.5;
    for sub in [[v[0], m01, m20], [v[1], m12, m01], [v[2], m20, m12], [m01, m12, m20]] {
        triangle_points(sub, levels - 1, out);
    }
}

/// Weighted sample points of a flat element; weights sum to its area.
/// Each level of refinement splits every triangle into four.
pub fn polygon_quadrature(shape: &Shape, levels: usize) -> Vec<(Point3, f64)> {
    let mut out = Vec::new();
    match shape {
        Shape::Triangle(t) => triangle_points(t.vertices(), levels, &mut out),
        Shape::Rectangle(r) => {
            let [a, b, c, d] = r.vertices();
            triangle_points([a, b, c], levels, &mut out);
            triangle_points([a, c, d], levels, &mut out);
        }
        Shape::LineSegment(l) => {
            let lambda = l.line_density();
            let len = l.length();
            let panels = 1 << levels;
            for p in 0..panels {
                let s0 = p as f64 / panels as f64;
                let s1 = (p + 1) as f64 / panels as f64;
                for (s, w) in gauss_on(8, s0, s1) {
                    out.push((l.p0 + (l.p1 - l.p0) * s, w * len * lambda));
                }
            }
        }
        Shape::ConicSection(_) => {}
    }
    out
}
