//! Every algorithm should land on the charge distribution Gaussian
//! elimination finds for the same surface.

use approx::assert_relative_eq;
use electrobem::surface::generators::SphericalCapacitor;
use electrobem::{Algorithm, ChargeDensitySolver, Precision, SolverOptions, SurfaceContainer};

fn capacitor() -> SurfaceContainer {
    // 60 triangles over three shells, one of them a dielectric interface
    SphericalCapacitor::default().triangulated(0)
}

fn densities(c: &SurfaceContainer) -> Vec<f64> {
    c.iter().map(|e| e.charge_density().unwrap()).collect()
}

fn solve(options: SolverOptions) -> SurfaceContainer {
    let mut c = capacitor();
    let stats = ChargeDensitySolver::new(options).unwrap().solve(&mut c).unwrap();
    assert!(stats.converged, "{:?}", stats.status);
    c
}

#[test]
fn iterative_solvers_match_direct() {
    let direct = densities(&solve(SolverOptions::new(Algorithm::Direct)));
    let scale = direct.iter().fold(0.0f64, |m, v| m.max(v.abs()));

    for algorithm in [
        Algorithm::Relaxation,
        Algorithm::GreedyCorrection,
        Algorithm::BlockCorrection,
        Algorithm::BiCgStab,
        Algorithm::Gmres,
    ] {
        let mut options = SolverOptions::new(algorithm).with_tolerance(1e-10).with_max_iterations(100_000);
        options.cache_matrix_elements = true;
        let x = densities(&solve(options));
        for (k, (a, b)) in x.iter().zip(&direct).enumerate() {
            assert!((a - b).abs() < 1e-6 * scale, "{algorithm}: element {k} has {a:e}, direct has {b:e}");
        }
    }
}

#[test]
fn jacobi_preconditioned_krylov_matches_direct() {
    let direct = solve(SolverOptions::new(Algorithm::Direct));
    for algorithm in [Algorithm::BiCgStab, Algorithm::Gmres] {
        let mut options = SolverOptions::new(algorithm).with_tolerance(1e-10);
        options.jacobi_preconditioner = true;
        let c = solve(options);
        for k in [0, 25, 59] {
            assert_relative_eq!(
                c.element(k).charge_density().unwrap(),
                direct.element(k).charge_density().unwrap(),
                max_relative = 1e-6
            );
        }
    }
}

#[test]
fn single_precision_greedy_correction() {
    let double = solve(SolverOptions::new(Algorithm::Direct));
    let options = SolverOptions::new(Algorithm::GreedyCorrection).with_tolerance(1e-5).with_precision(Precision::Single);
    let single = solve(options);
    let q = double.element(0).charge_density().unwrap();
    assert_relative_eq!(single.element(0).charge_density().unwrap(), q, max_relative = 1e-3);
}

#[test]
fn iteration_cap_reports_without_converging() {
    let mut c = capacitor();
    let options = SolverOptions::new(Algorithm::GreedyCorrection).with_tolerance(1e-12).with_max_iterations(5);
    let stats = ChargeDensitySolver::new(options).unwrap().solve(&mut c).unwrap();
    assert!(!stats.converged);
    assert_eq!(stats.status, electrobem::SolveStatus::MaxIterationsReached);
    // the partial solution is still committed
    assert!(c.iter().all(|e| e.basis().committed_iteration() == Some(stats.iterations)));
}
