//! End-to-end tests: demonstrations in, stable velocity field out.
//!
//! Demonstrations approach the origin from three directions with
//! exponentially decaying speed, the typical reaching motion the model is
//! built for.

use stable_ds::*;

const DT: f64 = 0.05;
const STEPS: usize = 80;

fn reaching_motion(start: [f64; 2], rng: &mut ModelRng) -> Trajectory {
    let positions = (0..=STEPS)
        .map(|i| {
            let decay = (-(i as f64) * DT).exp();
            vec![
                start[0] * decay + 0.001 * rng.standard_normal(),
                start[1] * decay + 0.001 * rng.standard_normal(),
            ]
        })
        .collect();
    Trajectory::from_positions(positions, DT).unwrap()
}

fn demonstrations() -> Vec<Trajectory> {
    let mut rng = ModelRng::with_seed(21);
    let starts = [
        [2.0, 2.0],
        [2.1, 1.9],
        [2.0, -2.0],
        [1.9, -2.1],
        [-2.0, 0.0],
        [-2.0, 0.1],
    ];
    starts.iter().map(|s| reaching_motion(*s, &mut rng)).collect()
}

fn config(seds: SedsConfig) -> DynamicsConfig {
    DynamicsConfig {
        n_components: 3,
        dt: DT,
        em: EmConfig::seeded(7),
        seds,
        ..DynamicsConfig::default()
    }
}

fn train(seds: SedsConfig) -> (DynamicalSystem, SedsReport) {
    let mut system = DynamicalSystem::new(config(seds));
    match system.train(&demonstrations(), None).unwrap() {
        TrainingOutcome::Trained { seds, .. } => (system, seds),
        TrainingOutcome::NothingToDo { reason } => panic!("training skipped: {}", reason),
    }
}

fn assert_stable(system: &DynamicalSystem, lyapunov: Option<&SedsReport>) {
    let gmm = system.mixture().unwrap();
    let p = lyapunov.map_or_else(|| nalgebra::DMatrix::identity(2, 2), |r| r.lyapunov.clone());
    let gmr = Gmr::new(gmm, vec![0, 1], vec![2, 3]).unwrap();
    for k in 0..gmm.n_states() {
        let rows = gmr.coefficients(k);
        let a = nalgebra::DMatrix::from_fn(2, 2, |i, j| rows[i][j]);
        let pa = &p * &a;
        let b = &pa + pa.transpose();
        let eigen = b.symmetric_eigenvalues();
        assert!(
            eigen.iter().all(|l| *l < 0.0),
            "component {} not contracting: {:?}",
            k,
            eigen
        );
    }
}

fn angle_between(a: &[f64], b: &[f64]) -> f64 {
    let dot = a[0] * b[0] + a[1] * b[1];
    let na = (a[0] * a[0] + a[1] * a[1]).sqrt();
    let nb = (b[0] * b[0] + b[1] * b[1]).sqrt();
    (dot / (na * nb)).clamp(-1.0, 1.0).acos()
}

/// Constant unit speed along the straight line from `start` to the origin.
fn straight_line(start: [f64; 2]) -> Trajectory {
    let length = (start[0] * start[0] + start[1] * start[1]).sqrt();
    let direction = [-start[0] / length, -start[1] / length];
    let steps = (length / DT).ceil() as usize;
    let mut samples: Vec<(Vec<f64>, Vec<f64>)> = (0..steps)
        .map(|i| {
            let travelled = i as f64 * DT;
            (
                vec![start[0] + travelled * direction[0], start[1] + travelled * direction[1]],
                direction.to_vec(),
            )
        })
        .collect();
    samples.push((vec![0.0, 0.0], vec![0.0, 0.0]));
    Trajectory::from_samples(samples).unwrap()
}

fn check_straight_line_scenario(seds: SedsConfig) {
    let starts = [[2.0, 2.0], [2.0, -2.0], [-2.0, 0.0]];
    let demos: Vec<Trajectory> = starts.iter().map(|s| straight_line(*s)).collect();
    let mut system = DynamicalSystem::new(DynamicsConfig {
        n_components: 2,
        ..config(seds.clone())
    });
    let outcome = system.train(&demos, None).unwrap();
    assert!(matches!(outcome, TrainingOutcome::Trained { .. }));
    assert!(system.endpoint().iter().all(|e| e.abs() < 1e-12));
    assert_stable(&system, None);

    for demo in &demos {
        for x in demo.positions() {
            if x[0].abs() < 1e-9 && x[1].abs() < 1e-9 {
                continue;
            }
            let v = system.velocity_at(x).unwrap();
            let angle = angle_between(&v, &[-x[0], -x[1]]);
            assert!(
                angle < 30f64.to_radians(),
                "{:?}: at {:?} velocity {:?} is {:.1} degrees off",
                seds.objective,
                x,
                v,
                angle.to_degrees()
            );
        }
    }

    for start in starts {
        let path = system.integrate(&start, 500).unwrap();
        assert!(path.len() <= 501);
        let end = path.last().unwrap();
        let distance = (end[0] * end[0] + end[1] * end[1]).sqrt();
        assert!(
            distance < 0.05,
            "{:?}: from {:?} stopped at {:?}",
            seds.objective,
            start,
            end
        );
    }
}

#[test]
fn test_straight_line_demonstrations_likelihood() {
    check_straight_line_scenario(SedsConfig::likelihood());
}

#[test]
fn test_straight_line_demonstrations_mse() {
    check_straight_line_scenario(SedsConfig::mean_square_error());
}

#[test]
fn test_mse_field_follows_demonstrations_and_converges() {
    let (system, report) = train(SedsConfig::mean_square_error());
    assert!(report.final_objective.is_finite());
    assert_stable(&system, None);

    // velocity along each demonstrated direction points back at the origin
    for start in [[2.0, 2.0], [2.0, -2.0], [-2.0, 0.0]] {
        let mid = [start[0] * 0.5, start[1] * 0.5];
        let v = system.velocity_at(&mid).unwrap();
        let towards = [-mid[0], -mid[1]];
        let angle = angle_between(&v, &towards);
        assert!(
            angle < 30f64.to_radians(),
            "at {:?} velocity {:?} is {:.1} degrees off",
            mid,
            v,
            angle.to_degrees()
        );
    }

    for start in [[2.0, 2.0], [2.0, -2.0], [-2.0, 0.0]] {
        let path = system.integrate(&start, 500).unwrap();
        let end = path.last().unwrap();
        let distance = (end[0] * end[0] + end[1] * end[1]).sqrt();
        assert!(distance < 0.05, "from {:?} stopped at {:?}", start, end);
    }
}

#[test]
fn test_likelihood_training_is_stable() {
    let (system, report) = train(SedsConfig::likelihood());
    assert_stable(&system, None);
    assert!(report.solver.max_violation < 1e-5);
    assert!(system.endpoint().iter().all(|e| e.abs() < 0.05));
}

#[test]
fn test_eigenvalue_criterion_with_joint_lyapunov_is_stable() {
    let mut seds = SedsConfig::with_lyapunov();
    seds.criterion = StabilityCriterion::Eigenvalues;
    let (system, report) = train(seds);
    assert!(report.lyapunov.symmetric_eigenvalues().iter().all(|l| *l > 0.0));
    assert_stable(&system, Some(&report));
}

#[test]
fn test_stable_even_far_from_data() {
    let (system, _) = train(SedsConfig::mean_square_error());
    for x in [[50.0, -30.0], [-100.0, 100.0], [0.0, 1e4]] {
        let v = system.velocity_at(&x).unwrap();
        assert!(v.iter().all(|c| c.is_finite()));
        // never pushes away from the attractor
        let e = system.endpoint();
        let radial = v[0] * (x[0] - e[0]) + v[1] * (x[1] - e[1]);
        assert!(radial <= 0.0, "outward velocity {:?} at {:?}", v, x);
    }
}

#[test]
fn test_saved_model_reproduces_velocities() {
    let (system, _) = train(SedsConfig::mean_square_error());
    let path = std::env::temp_dir().join(format!("stable_ds_e2e_{}.txt", std::process::id()));
    system.save_model(&path).unwrap();

    let mut restored = DynamicalSystem::new(config(SedsConfig::mean_square_error()));
    restored.load_model(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(restored.endpoint(), system.endpoint());
    for x in [[1.0, 1.0], [-0.5, 0.2], [1.5, -1.0]] {
        let a = system.velocity_at(&x).unwrap();
        let b = restored.velocity_at(&x).unwrap();
        for (u, w) in a.iter().zip(&b) {
            assert!((u - w).abs() < 1e-9, "{:?} vs {:?}", a, b);
        }
    }
}
