//! Three-shell capacitor with two dielectric layers against its closed form.

use approx::assert_relative_eq;
use electrobem::integrator::AnalyticIntegrator;
use electrobem::surface::Point3;
use electrobem::surface::generators::SphericalCapacitor;
use electrobem::{Algorithm, ChargeDensitySolver, IntegratingFieldSolver, SolverOptions, SurfaceContainer};

/// Charge on each of the three shells, in element order.
fn shell_charges(c: &SurfaceContainer, per_shell: usize) -> [f64; 3] {
    let mut q = [0.0; 3];
    for (k, e) in c.iter().enumerate() {
        q[k / per_shell] += e.charge_density().unwrap() * e.area();
    }
    q
}

#[test]
fn triangulated_shells_carry_closed_form_charges() {
    let cap = SphericalCapacitor::default();
    let mut c = cap.triangulated(2);
    let mut options = SolverOptions::new(Algorithm::Gmres).with_tolerance(1e-8);
    options.cache_matrix_elements = true;
    let stats = ChargeDensitySolver::new(options).unwrap().solve(&mut c).unwrap();
    assert!(stats.converged);

    let expected = cap.shell_charges();
    let q = shell_charges(&c, 320);
    for k in 0..3 {
        assert_relative_eq!(q[k], expected[k], max_relative = 0.05);
    }

    let integrator = AnalyticIntegrator::new();
    let field = IntegratingFieldSolver::new(&c, &integrator).unwrap();
    for r in [1.5, 2.5] {
        let p = Point3::new(0.3, -0.4, r * 0.866_025_403_784_438_6);
        let p = p * (r / p.norm());
        assert_relative_eq!(field.potential(&p), cap.potential_at(r), max_relative = 0.05);
        let e = field.electric_field(&p);
        assert_relative_eq!(e.dot(&p.normalize()), cap.field_at(r), max_relative = 0.05);
    }
}

#[test]
fn refined_triangulation_is_accurate_to_a_percent() {
    let cap = SphericalCapacitor::default();
    let mut c = cap.triangulated(3);
    assert_eq!(c.len(), 3 * 1280);
    let mut options = SolverOptions::new(Algorithm::Gmres).with_tolerance(1e-8);
    options.cache_matrix_elements = true;
    let stats = ChargeDensitySolver::new(options).unwrap().solve(&mut c).unwrap();
    assert!(stats.converged);

    let expected = cap.shell_charges();
    let q = shell_charges(&c, 1280);
    for k in 0..3 {
        assert_relative_eq!(q[k], expected[k], max_relative = 0.01);
    }

    let integrator = AnalyticIntegrator::new();
    let field = IntegratingFieldSolver::new(&c, &integrator).unwrap();
    let p = Point3::new(0.3, -0.4, 1.3).normalize() * 1.5;
    assert_relative_eq!(field.potential(&p), cap.potential_at(1.5), max_relative = 0.01);
}

#[test]
fn axisymmetric_shells_carry_closed_form_charges() {
    let cap = SphericalCapacitor::default();
    let mut c = cap.axisymmetric(80);
    let stats = ChargeDensitySolver::new(SolverOptions::new(Algorithm::Direct)).unwrap().solve(&mut c).unwrap();
    assert!(stats.converged);
    let expected = cap.shell_charges();
    let q = shell_charges(&c, 80);
    for k in 0..3 {
        assert_relative_eq!(q[k], expected[k], max_relative = 0.02);
    }
}
