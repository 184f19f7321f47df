//! Solves the three-shell dielectric capacitor and compares the shell
//! charges and the potential between the shells with the closed form.
//!
//! ```text
//! RUST_LOG=info cargo run --example spherical_capacitor -- gmres 2
//! ```

use electrobem::integrator::AnalyticIntegrator;
use electrobem::surface::Point3;
use electrobem::surface::generators::SphericalCapacitor;
use electrobem::{Algorithm, BemError, ChargeDensitySolver, IntegratingFieldSolver, SolverOptions};

fn main() -> Result<(), BemError> {
    env_logger::init();
    let mut args = std::env::args().skip(1);
    let algorithm: Algorithm = args.next().as_deref().unwrap_or("gmres").parse()?;
    let subdivisions: usize = args
        .next()
        .map(|s| s.parse().map_err(|_| BemError::InvalidConfig(format!("bad subdivision count '{s}'"))))
        .transpose()?
        .unwrap_or(2);

    let capacitor = SphericalCapacitor::default();
    let mut surface = capacitor.triangulated(subdivisions);
    let per_shell = surface.len() / 3;
    println!("{} elements, {algorithm}", surface.len());

    let mut options = SolverOptions::new(algorithm);
    options.cache_matrix_elements = true;
    options.display_interval = 10;
    let mut solver = ChargeDensitySolver::new(options)?;
    let stats = solver.solve(&mut surface)?;
    println!("{:?} after {} iterations, residual {:.3e}", stats.status, stats.iterations, stats.final_residual);

    let expected = capacitor.shell_charges();
    for (shell, q_exact) in expected.iter().enumerate() {
        let q: f64 = surface
            .iter()
            .skip(shell * per_shell)
            .take(per_shell)
            .map(|e| e.charge_density().unwrap_or(0.0) * e.area())
            .sum();
        println!("shell {shell}: Q = {q:+.6e} C, exact {q_exact:+.6e} C, error {:.3}%", 100.0 * (q / q_exact - 1.0));
    }

    let integrator = AnalyticIntegrator::new();
    let field = IntegratingFieldSolver::new(&surface, &integrator)?;
    for r in [1.25, 1.5, 1.75, 2.25, 2.5, 2.75] {
        let p = Point3::new(0.0, 0.0, r);
        println!(
            "r = {r:.2}: V = {:.6} V (exact {:.6}), E = {:.6e} V/m (exact {:.6e})",
            field.potential(&p),
            capacitor.potential_at(r),
            field.electric_field(&p).z,
            capacitor.field_at(r)
        );
    }
    Ok(())
}
