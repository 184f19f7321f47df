use electrobem::surface::generators::icosphere;
use electrobem::surface::{BoundaryElement, Point3, Triangle};
use electrobem::{AcceleratorBackend, Algorithm, BemError, ChargeDensitySolver, SolverOptions, SurfaceContainer};

fn sphere() -> SurfaceContainer {
    icosphere(1.0, 0, Point3::zeros()).into_iter().map(|t| BoundaryElement::dirichlet(t, 1.0)).collect()
}

#[test]
fn options_load_from_json_file() {
    let path = std::env::temp_dir().join(format!("electrobem-options-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"{ "algorithm": "block-correction", "subspace_dimension": 4, "tolerance": 1e-6, "display_interval": 10 }"#,
    )
    .unwrap();
    let options = SolverOptions::from_json_file(&path).unwrap();
    assert_eq!(options.algorithm, Algorithm::BlockCorrection);
    assert_eq!(options.subspace_dimension, 4);
    assert_eq!(options.resolved_check_interval(100), 25);
    let _ = std::fs::remove_file(&path);

    assert!(matches!(SolverOptions::from_json_file("/nonexistent/options.json"), Err(BemError::Io(_))));
    assert!(matches!(SolverOptions::from_json_str("{ algorithm: }"), Err(BemError::Json(_))));
}

#[test]
fn unknown_algorithm_names_are_reported() {
    match "conjugate-gradient".parse::<Algorithm>() {
        Err(BemError::UnknownAlgorithm(name)) => assert_eq!(name, "conjugate-gradient"),
        other => panic!("unexpected {other:?}"),
    }
}

#[cfg(not(feature = "mpi"))]
#[test]
fn cluster_backend_needs_mpi_support() {
    let mut options = SolverOptions::new(Algorithm::Gmres);
    options.backend = AcceleratorBackend::CLUSTER;
    let mut solver = ChargeDensitySolver::new(options).unwrap();
    assert!(matches!(solver.solve(&mut sphere()), Err(BemError::InvalidConfig(_))));
}

#[cfg(not(feature = "gpu"))]
#[test]
fn gpu_backend_needs_gpu_support() {
    let mut options = SolverOptions::new(Algorithm::Gmres);
    options.backend = "gpu".parse().unwrap();
    let mut solver = ChargeDensitySolver::new(options).unwrap();
    assert!(matches!(solver.solve(&mut sphere()), Err(BemError::InvalidConfig(_))));
}

#[test]
fn degenerate_elements_are_rejected_before_solving() {
    let mut c = sphere();
    c.push(BoundaryElement::dirichlet(
        Triangle::from_vertices(Point3::zeros(), Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)),
        1.0,
    ));
    let mut solver = ChargeDensitySolver::new(SolverOptions::new(Algorithm::Direct)).unwrap();
    assert!(matches!(solver.solve(&mut c), Err(BemError::DegenerateGeometry(_))));
    assert!(c.element(0).charge_density().is_none());
}
