//! Cartesian Taylor expansions of `1/|x − y|` truncated at total degree `p`.
//!
//! Coefficients are stored per multi-index α = (α₀, α₁, α₂) with |α| ≤ p,
//! ordered by total degree. With `R = x − c` and `d = y − c`,
//!
//! ```text
//! 1/|x − y| = Σ_α a_α(R) · d^α,    a_α(R) = (1/α!) ∂_y^α 1/|x − y|
//! ```
//!
//! and the `a_α` satisfy the recurrence
//! `|α|·r²·a_α = (2|α| − 1)·Σᵢ Rᵢ·a_{α−eᵢ} − (|α| − 1)·Σᵢ a_{α−2eᵢ}`.

use crate::surface::Point3;

/// Multi-index tables and translation operators for one degree.
#[derive(Clone, Debug)]
pub struct ExpansionBasis {
    degree: usize,
    terms: Vec<[usize; 3]>,
    lookup: Vec<usize>,
    /// (small, big, big − small, C(big, small)) for every small ≤ big
    shifts: Vec<(usize, usize, usize, f64)>,
    /// (γ, α, α + γ, (−1)^|γ| C(α + γ, α)) for |α + γ| ≤ p
    m2l: Vec<(usize, usize, usize, f64)>,
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

fn multi_binomial(big: [usize; 3], small: [usize; 3]) -> f64 {
    (0..3).map(|i| binomial(big[i], small[i])).product()
}

impl ExpansionBasis {
    pub fn new(degree: usize) -> Self {
        let side = degree + 1;
        let mut terms = Vec::new();
        for total in 0..=degree {
            for a in (0..=total).rev() {
                for b in (0..=total - a).rev() {
                    terms.push([a, b, total - a - b]);
                }
            }
        }
        let mut lookup = vec![usize::MAX; side * side * side];
        for (k, t) in terms.iter().enumerate() {
            lookup[(t[0] * side + t[1]) * side + t[2]] = k;
        }
        let mut basis = ExpansionBasis { degree, terms, lookup, shifts: Vec::new(), m2l: Vec::new() };

        for (bi, &big) in basis.terms.iter().enumerate() {
            for (si, &small) in basis.terms.iter().enumerate() {
                if (0..3).all(|i| small[i] <= big[i]) {
                    let diff = [big[0] - small[0], big[1] - small[1], big[2] - small[2]];
                    basis.shifts.push((si, bi, basis.index(diff), multi_binomial(big, small)));
                }
            }
        }
        for (gi, &g) in basis.terms.iter().enumerate() {
            let sign = if (g[0] + g[1] + g[2]) % 2 == 0 { 1.0 } else { -1.0 };
            for (ai, &a) in basis.terms.iter().enumerate() {
                let sum = [a[0] + g[0], a[1] + g[1], a[2] + g[2]];
                if sum.iter().sum::<usize>() <= degree {
                    basis.m2l.push((gi, ai, basis.index(sum), sign * multi_binomial(sum, a)));
                }
            }
        }
        basis
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Number of coefficients in one expansion.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    fn index(&self, t: [usize; 3]) -> usize {
        let side = self.degree + 1;
        self.lookup[(t[0] * side + t[1]) * side + t[2]]
    }

    /// Monomials `d^α` for every term.
    pub fn powers(&self, d: &Point3) -> Vec<f64> {
        let mut out = vec![0.0; self.len()];
        out[0] = 1.0;
        for k in 1..self.len() {
            let t = self.terms[k];
            let i = (0..3).find(|&i| t[i] > 0).unwrap_or(0);
            let mut lower = t;
            lower[i] -= 1;
            out[k] = out[self.index(lower)] * d[i];
        }
        out
    }

    /// Taylor coefficients `a_α(R)` of `1/|R|`.
    pub fn derivatives(&self, r: &Point3) -> Vec<f64> {
        let r2 = r.norm_squared();
        let mut a = vec![0.0; self.len()];
        a[0] = 1.0 / r2.sqrt();
        for k in 1..self.len() {
            let t = self.terms[k];
            let n = (t[0] + t[1] + t[2]) as f64;
            let mut first = 0.0;
            let mut second = 0.0;
            for i in 0..3 {
                if t[i] >= 1 {
                    let mut l = t;
                    l[i] -= 1;
                    first += r[i] * a[self.index(l)];
                }
                if t[i] >= 2 {
                    let mut l = t;
                    l[i] -= 2;
                    second += a[self.index(l)];
                }
            }
            a[k] = ((2.0 * n - 1.0) * first - (n - 1.0) * second) / (n * r2);
        }
        a
    }

    /// Adds `q·(y − c)^α` to the multipole `m`.
    pub fn p2m(&self, q: f64, offset: &Point3, m: &mut [f64]) {
        for (mk, p) in m.iter_mut().zip(self.powers(offset)) {
            *mk += q * p;
        }
    }

    /// Translates a child multipole to its parent; `d` is child − parent.
    pub fn m2m(&self, child: &[f64], d: &Point3, parent: &mut [f64]) {
        let pw = self.powers(d);
        for &(small, big, diff, c) in &self.shifts {
            parent[big] += c * pw[diff] * child[small];
        }
    }

    /// Converts the multipole about `c` into a local expansion about `l`;
    /// `r` is `l − c`.
    pub fn m2l(&self, m: &[f64], r: &Point3, local: &mut [f64]) {
        let a = self.derivatives(r);
        for &(g, al, sum, c) in &self.m2l {
            local[g] += c * m[al] * a[sum];
        }
    }

    /// Re-centres a local expansion; `d` is new centre − old centre.
    pub fn l2l(&self, parent: &[f64], d: &Point3, child: &mut [f64]) {
        let pw = self.powers(d);
        for &(small, big, diff, c) in &self.shifts {
            child[small] += c * pw[diff] * parent[big];
        }
    }

    /// Value and gradient of a local expansion at offset `h` from its centre.
    pub fn l2p(&self, local: &[f64], h: &Point3) -> (f64, Point3) {
        let pw = self.powers(h);
        let value = local.iter().zip(&pw).map(|(l, p)| l * p).sum();
        let mut grad = Point3::zeros();
        for (k, t) in self.terms.iter().enumerate() {
            for i in 0..3 {
                if t[i] > 0 {
                    let mut lower = *t;
                    lower[i] -= 1;
                    grad[i] += local[k] * t[i] as f64 * pw[self.index(lower)];
                }
            }
        }
        (value, grad)
    }

    /// Direct evaluation of a multipole at `r = x − c`, mostly for checks.
    pub fn m2p(&self, m: &[f64], r: &Point3) -> f64 {
        self.derivatives(r).iter().zip(m).map(|(a, m)| a * m).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sources() -> Vec<(Point3, f64)> {
        vec![
            (Point3::new(0.1, -0.2, 0.05), 1.0),
            (Point3::new(-0.15, 0.1, 0.2), -0.5),
            (Point3::new(0.2, 0.2, -0.1), 2.0),
        ]
    }

    fn direct(x: &Point3) -> f64 {
        sources().iter().map(|(y, q)| q / (x - y).norm()).sum()
    }

    #[test]
    fn derivatives_match_closed_form() {
        let basis = ExpansionBasis::new(2);
        let r = Point3::new(0.3, -1.2, 0.7);
        let a = basis.derivatives(&r);
        let n = r.norm();
        assert_relative_eq!(a[0], 1.0 / n, max_relative = 1e-14);
        // terms of degree 1 are ordered (1,0,0), (0,1,0), (0,0,1)
        assert_relative_eq!(a[1], r.x / n.powi(3), max_relative = 1e-14);
        assert_relative_eq!(a[2], r.y / n.powi(3), max_relative = 1e-14);
        // (2,0,0)
        assert_relative_eq!(a[4], (3.0 * r.x * r.x - n * n) / (2.0 * n.powi(5)), max_relative = 1e-12);
    }

    #[test]
    fn multipole_error_decays_with_degree() {
        let x = Point3::new(2.0, 1.5, -1.0);
        let exact = direct(&x);
        let mut last = f64::INFINITY;
        for p in [1, 3, 5, 7] {
            let basis = ExpansionBasis::new(p);
            let mut m = vec![0.0; basis.len()];
            for (y, q) in sources() {
                basis.p2m(q, &y, &mut m);
            }
            let err = (basis.m2p(&m, &x) - exact).abs();
            assert!(err < last, "degree {p}: {err} !< {last}");
            last = err;
        }
        assert!(last / exact.abs() < 1e-6);
    }

    #[test]
    fn translations_preserve_the_field() {
        let basis = ExpansionBasis::new(10);
        let child = Point3::new(0.05, -0.05, 0.1);
        let parent = Point3::zeros();
        let mut mc = vec![0.0; basis.len()];
        for (y, q) in sources() {
            basis.p2m(q, &(y - child), &mut mc);
        }
        let mut mp = vec![0.0; basis.len()];
        basis.m2m(&mc, &(child - parent), &mut mp);

        let l = Point3::new(3.0, 2.5, 2.0);
        let mut local = vec![0.0; basis.len()];
        basis.m2l(&mp, &(l - parent), &mut local);
        let l_child = l + Point3::new(0.1, -0.1, 0.05);
        let mut local_child = vec![0.0; basis.len()];
        basis.l2l(&local, &(l_child - l), &mut local_child);

        let x = l_child + Point3::new(0.05, 0.02, -0.04);
        let (value, grad) = basis.l2p(&local_child, &(x - l_child));
        assert_relative_eq!(value, direct(&x), max_relative = 1e-7);

        let h = 1e-5;
        for i in 0..3 {
            let mut e = Point3::zeros();
            e[i] = h;
            let fd = (direct(&(x + e)) - direct(&(x - e))) / (2.0 * h);
            assert_relative_eq!(grad[i], fd, max_relative = 1e-4);
        }
    }
}
