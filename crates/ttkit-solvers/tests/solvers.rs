//! End-to-end solver behavior on seeded random problems.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use ttkit_solvers::{
    Adf, GeometricCg, HosvdMode, MeasurementSet, PerformanceData, Retraction, SteepestDescent,
};
use ttkit_tensortrain::{TtOperator, TtTensor};

/// A well-conditioned self-adjoint positive definite operator:
/// `c * I + B + B^T` with `c` above the symmetrized norm.
fn random_spd_operator(dims: &[usize], ranks: &[usize], rng: &mut ChaCha8Rng) -> TtOperator<f64> {
    let full: Vec<usize> = dims.iter().chain(dims.iter()).copied().collect();
    let b = TtOperator::<f64>::random(&full, ranks, rng).unwrap();
    let mut sym = (&b + &b.transposed()).unwrap();

    let shift = 4.0 * b.frob_norm() + 1.0;
    let id = TtOperator::<f64>::identity(&full).unwrap();
    sym.add_assign(&id.scaled(shift)).unwrap();
    sym
}

#[test]
fn adf_recovers_exact_rank_tensor_from_full_grid() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let truth = TtTensor::<f64>::random(&[3, 3, 3], &[2, 2], &mut rng).unwrap();

    let mut measurements = MeasurementSet::<f64>::new();
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                let pos = vec![i, j, k];
                let value = truth.evaluate(&pos).unwrap();
                measurements.add(pos, value).unwrap();
            }
        }
    }

    let mut x = TtTensor::<f64>::random(&[3, 3, 3], &[2, 2], &mut rng).unwrap();
    let solver = Adf {
        max_iterations: 20,
        convergence_epsilon: 1e-12,
        ..Adf::default()
    };
    let residual = solver
        .solve(&mut x, &measurements, &mut PerformanceData::inactive())
        .unwrap();

    assert!(residual < 1e-10, "final relative residual {residual:e}");
    assert!(measurements.test_solution(&x).unwrap() < 1e-8);
}

#[test]
fn adf_converges_on_sampled_measurements() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let dims = [5usize, 5, 5, 5];
    let truth = TtTensor::<f64>::random(&dims, &[2, 2, 2], &mut rng).unwrap();

    // Ten measurements per degree of freedom of the sought chain.
    let mut measurements = MeasurementSet::<f64>::random(&dims, 400, &mut rng).unwrap();
    let positions = measurements.positions.clone();
    for (pos, value) in positions.iter().zip(measurements.values.iter_mut()) {
        *value = truth.evaluate(pos).unwrap();
    }

    let mut x = TtTensor::<f64>::random(&dims, &[2, 2, 2], &mut rng).unwrap();
    let solver = Adf {
        max_iterations: 50,
        convergence_epsilon: 1e-8,
        ..Adf::default()
    };
    let residual = solver
        .solve(&mut x, &measurements, &mut PerformanceData::inactive())
        .unwrap();

    assert!(residual < 1e-6, "final relative residual {residual:e}");
}

#[test]
fn adf_rejects_mismatched_measurements() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let mut x = TtTensor::<f64>::random(&[3, 3, 3], &[2, 2], &mut rng).unwrap();

    let mut short = MeasurementSet::<f64>::new();
    short.add(vec![0, 1], 1.0).unwrap();
    assert!(Adf::default()
        .solve(&mut x, &short, &mut PerformanceData::inactive())
        .is_err());

    let mut out_of_range = MeasurementSet::<f64>::new();
    out_of_range.add(vec![0, 1, 7], 1.0).unwrap();
    assert!(Adf::default()
        .solve(&mut x, &out_of_range, &mut PerformanceData::inactive())
        .is_err());
}

#[test]
fn steepest_descent_reduces_spd_residual() {
    let mut rng = ChaCha8Rng::seed_from_u64(21);
    let dims = [10usize, 10, 10];
    let a = random_spd_operator(&dims, &[2, 2], &mut rng);
    let b = TtTensor::<f64>::random(&dims, &[2, 2], &mut rng).unwrap();
    let mut x = TtTensor::<f64>::random(&dims, &[4, 4], &mut rng).unwrap();

    let solver = SteepestDescent::<f64> {
        max_steps: 20,
        convergence_epsilon: 1e-10,
        assume_spd: true,
        retraction: Retraction::Submanifold,
        verbosity: 0,
    };

    let initial = {
        let ax = a.apply(&x).unwrap();
        (&b - &ax).unwrap().frob_norm()
    };
    let mut perf = PerformanceData::new();
    let residual = solver.solve(Some(&a), &mut x, &b, &mut perf).unwrap();

    assert!(
        residual * 10.0 <= initial,
        "residual only went from {initial:e} to {residual:e}"
    );

    // Residuals decrease monotonically for an SPD system.
    let recorded: Vec<f64> = perf.data().iter().map(|d| d.residual).collect();
    for pair in recorded.windows(2) {
        assert!(
            pair[1] <= pair[0] * (1.0 + 1e-6),
            "residual increased: {:?}",
            pair
        );
    }
}

#[test]
fn steepest_descent_projects_without_operator() {
    let mut rng = ChaCha8Rng::seed_from_u64(33);
    let dims = [6usize, 6, 6];
    let b = TtTensor::<f64>::random(&dims, &[2, 2], &mut rng).unwrap();
    let mut x = TtTensor::<f64>::random(&dims, &[4, 4], &mut rng).unwrap();

    let solver = SteepestDescent::<f64> {
        max_steps: 10,
        convergence_epsilon: 1e-12,
        retraction: Retraction::Hosvd(HosvdMode::Rank(4)),
        ..SteepestDescent::default()
    };
    let residual = solver
        .solve(None, &mut x, &b, &mut PerformanceData::inactive())
        .unwrap();

    // b has rank 2, so the rank-4 manifold contains it.
    assert!(residual < 1e-8, "projection residual {residual:e}");
}

#[test]
fn geometric_cg_reduces_spd_residual() {
    let mut rng = ChaCha8Rng::seed_from_u64(55);
    let dims = [8usize, 8, 8];
    let a = random_spd_operator(&dims, &[2, 2], &mut rng);
    let b = TtTensor::<f64>::random(&dims, &[2, 2], &mut rng).unwrap();
    let mut x = TtTensor::<f64>::random(&dims, &[4, 4], &mut rng).unwrap();

    let solver = GeometricCg::<f64> {
        max_steps: 20,
        convergence_epsilon: 1e-10,
        assume_spd: true,
        retraction: Retraction::Submanifold,
        ..GeometricCg::default()
    };

    let initial = {
        let ax = a.apply(&x).unwrap();
        (&b - &ax).unwrap().frob_norm()
    };
    let residual = solver
        .solve(&a, &mut x, &b, &mut PerformanceData::inactive())
        .unwrap();
    assert!(
        residual * 10.0 <= initial,
        "residual only went from {initial:e} to {residual:e}"
    );
}

#[test]
fn als_retraction_recovers_representable_step() {
    let mut rng = ChaCha8Rng::seed_from_u64(77);
    let dims = [4usize, 4, 4];
    let mut x = TtTensor::<f64>::random(&dims, &[2, 2], &mut rng).unwrap();
    let step = x.scaled(0.5);

    let expect = x.scaled(1.5);
    Retraction::Als.apply(&mut x, &step).unwrap();

    let diff = (&x - &expect).unwrap().frob_norm();
    assert!(
        diff < 1e-8 * expect.frob_norm(),
        "fit error {diff:e} against norm {:e}",
        expect.frob_norm()
    );
}

#[test]
fn custom_retraction_is_invoked() {
    let mut rng = ChaCha8Rng::seed_from_u64(88);
    let dims = [4usize, 4, 4];
    let b = TtTensor::<f64>::random(&dims, &[2, 2], &mut rng).unwrap();
    let mut x = TtTensor::<f64>::random(&dims, &[2, 2], &mut rng).unwrap();

    let retraction = Retraction::Custom(Box::new(|x: &mut TtTensor<f64>, step| {
        x.add_assign(step)?;
        x.round_rank(2)?;
        Ok(())
    }));

    let solver = SteepestDescent::<f64> {
        max_steps: 5,
        retraction,
        ..SteepestDescent::default()
    };
    solver
        .solve(None, &mut x, &b, &mut PerformanceData::inactive())
        .unwrap();
    assert!(x.ranks().iter().all(|&r| r <= 2));
}

#[test]
fn solver_progress_is_recorded_and_dumped() {
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let dims = [5usize, 5, 5];
    let a = random_spd_operator(&dims, &[2, 2], &mut rng);
    let b = TtTensor::<f64>::random(&dims, &[2, 2], &mut rng).unwrap();
    let mut x = TtTensor::<f64>::random(&dims, &[3, 3], &mut rng).unwrap();

    let mut perf = PerformanceData::new();
    perf.set_annotation("spd steepest descent");
    let solver = SteepestDescent::<f64> {
        max_steps: 8,
        assume_spd: true,
        ..SteepestDescent::default()
    };
    solver.solve(Some(&a), &mut x, &b, &mut perf).unwrap();
    assert!(!perf.data().is_empty());

    let dir = std::env::temp_dir().join("ttkit_solver_test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("descent.dat");
    perf.dump_to_file(&path).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("# spd steepest descent\n# \n#itr \ttime[us] \tresidual"));

    let hist = perf.get_histogram(10.0);
    let bucketed: u64 = hist.buckets.values().sum();
    assert_eq!(bucketed, hist.total_time);
}
