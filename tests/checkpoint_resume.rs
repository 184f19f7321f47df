use electrobem::checkpoint::CheckpointStore;
use electrobem::surface::generators::icosphere;
use electrobem::surface::{BoundaryElement, Point3};
use electrobem::{Algorithm, CheckpointOptions, ChargeDensitySolver, Precision, SolverOptions, SurfaceContainer};
use std::path::PathBuf;

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("electrobem-it-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn sphere() -> SurfaceContainer {
    icosphere(1.0, 1, Point3::zeros()).into_iter().map(|t| BoundaryElement::dirichlet(t, 1.0)).collect()
}

fn relaxation(max_iterations: usize) -> SolverOptions {
    let mut options = SolverOptions::new(Algorithm::Relaxation).with_tolerance(1e-12).with_max_iterations(max_iterations);
    options.cache_matrix_elements = true;
    options
}

#[test]
fn resumed_solve_reproduces_uninterrupted_one() {
    let dir = scratch("resume");
    let checkpoint = CheckpointOptions { directory: dir.clone(), interval: 2, resume: true };

    let mut reference = sphere();
    let full = ChargeDensitySolver::new(relaxation(12)).unwrap().solve(&mut reference).unwrap();
    assert_eq!(full.iterations, 12);

    // stop early, then continue from the file left behind
    let mut interrupted = sphere();
    let first = ChargeDensitySolver::new(relaxation(5).with_checkpoint(checkpoint.clone()))
        .unwrap()
        .solve(&mut interrupted)
        .unwrap();
    assert_eq!(first.iterations, 5);
    assert_eq!(first.resumed_from, None);

    let resumed = ChargeDensitySolver::new(relaxation(12).with_checkpoint(checkpoint))
        .unwrap()
        .solve(&mut interrupted)
        .unwrap();
    assert_eq!(resumed.resumed_from, Some(5));
    assert_eq!(resumed.iterations, 12);
    assert_eq!(resumed.listener_errors, 0);
    for (a, b) in interrupted.iter().zip(reference.iter()) {
        let (a, b) = (a.charge_density().unwrap(), b.charge_density().unwrap());
        assert!((a - b).abs() <= 1e-12 * b.abs(), "{a:e} != {b:e}");
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn checkpoint_of_another_surface_is_not_resumed() {
    let dir = scratch("mismatch");
    let options = relaxation(4);
    let container = sphere();

    // plant a checkpoint at the path this solve will look at, but written for
    // a different geometry
    let store = CheckpointStore::new(&dir, container.fingerprint(), options.fingerprint(), Precision::Double);
    let foreign = CheckpointStore::new(&dir, container.fingerprint() ^ 1, options.fingerprint(), Precision::Double);
    std::fs::create_dir_all(&dir).unwrap();
    let state = electrobem::SolverState { iteration: 3, solution: vec![0.0; 80], residual_history: vec![1.0; 3] };
    let written = foreign.write(&state).unwrap();
    std::fs::rename(&written, store.path()).unwrap();

    let checkpoint = CheckpointOptions { directory: dir.clone(), interval: 0, resume: true };
    let mut c = sphere();
    let stats = ChargeDensitySolver::new(options.with_checkpoint(checkpoint)).unwrap().solve(&mut c).unwrap();
    assert_eq!(stats.resumed_from, None);
    assert_eq!(stats.listener_errors, 1);
    assert_eq!(stats.iterations, 4);
    // the finish hook replaced the foreign file with this solve's result
    assert!(store.read::<f64>(80).unwrap().is_some());
    let _ = std::fs::remove_dir_all(&dir);
}
