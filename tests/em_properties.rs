//! Properties of EM training and mixture regression on synthetic data.

use assert_approx_eq::assert_approx_eq;
use stable_ds::*;

fn blobs(rng: &mut ModelRng, centers: &[[f64; 2]], per_blob: usize, spread: f64) -> Vec<Vec<f64>> {
    let mut data = Vec::with_capacity(centers.len() * per_blob);
    for c in centers {
        for _ in 0..per_blob {
            data.push(vec![
                c[0] + spread * rng.standard_normal(),
                c[1] + spread * rng.standard_normal(),
            ]);
        }
    }
    data
}

#[test]
fn test_history_non_decreasing_for_every_covariance_kind() {
    for seed in [1, 2, 3] {
        let mut rng = ModelRng::with_seed(seed);
        let data = blobs(&mut rng, &[[0.0, 0.0], [4.0, 1.0], [-2.0, 5.0]], 60, 0.7);
        for kind in [CovarianceKind::Full, CovarianceKind::Diagonal, CovarianceKind::Spherical] {
            let mut gmm = Gmm::new(3, 2);
            let config = EmConfig {
                covariance_kind: kind,
                ..EmConfig::seeded(seed)
            };
            let report = gmm.train(&data, &config, &mut rng).unwrap();
            assert!(report.iterations > 0);
            if report.reseeds > 0 {
                continue;
            }
            for pair in report.history.windows(2) {
                assert!(
                    pair[1] >= pair[0] - 1e-6,
                    "seed {} {:?}: {} after {}",
                    seed,
                    kind,
                    pair[1],
                    pair[0]
                );
            }
        }
    }
}

#[test]
fn test_seeded_training_is_reproducible() {
    let mut data_rng = ModelRng::with_seed(4);
    let data = blobs(&mut data_rng, &[[0.0, 0.0], [3.0, 3.0]], 50, 0.5);
    let fit = || {
        let mut gmm = Gmm::new(2, 2);
        let mut rng = ModelRng::with_seed(17);
        gmm.train(&data, &EmConfig::seeded(17), &mut rng).unwrap();
        gmm
    };
    let a = fit();
    let b = fit();
    assert_eq!(a.priors(), b.priors());
    for k in 0..2 {
        assert_eq!(a.component(k).mean(), b.component(k).mean());
    }
}

#[test]
fn test_responsibilities_sum_to_one_and_agree_with_most_likely_state() {
    let mut rng = ModelRng::with_seed(6);
    let data = blobs(&mut rng, &[[0.0, 0.0], [5.0, 0.0]], 40, 0.5);
    let mut gmm = Gmm::new(2, 2);
    gmm.train(&data, &EmConfig::seeded(6), &mut rng).unwrap();
    for x in data.iter().step_by(7) {
        let r = gmm.responsibilities(x).unwrap();
        assert_approx_eq!(r.iter().sum::<f64>(), 1.0, 1e-9);
        let best = r
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (k, v)| if *v > acc.1 { (k, *v) } else { acc })
            .0;
        assert_eq!(gmm.most_likely_state(x).unwrap(), best);
    }
}

#[test]
fn test_log_likelihood_improves_over_initialization() {
    let mut rng = ModelRng::with_seed(12);
    let data = blobs(&mut rng, &[[0.0, 0.0], [4.0, 4.0]], 50, 0.6);
    let mut gmm = Gmm::new(2, 2);
    gmm.init(&data, InitPolicy::Random, CovarianceKind::Full, &mut rng).unwrap();
    let before = gmm.log_likelihood(&data).unwrap();
    gmm.refine(&data, &EmConfig::default(), &mut rng).unwrap();
    let after = gmm.log_likelihood(&data).unwrap();
    assert!(after >= before - 1e-9, "{} < {}", after, before);
}

#[test]
fn test_regression_on_trained_linear_data() {
    // y = -0.5 x + noise over two separated x ranges
    let mut rng = ModelRng::with_seed(31);
    let data: Vec<Vec<f64>> = (0..200)
        .map(|i| {
            let x = if i % 2 == 0 { rng.uniform(-3.0, -1.0) } else { rng.uniform(1.0, 3.0) };
            vec![x, -0.5 * x + 0.01 * rng.standard_normal()]
        })
        .collect();
    let mut gmm = Gmm::new(2, 2);
    gmm.train(&data, &EmConfig::seeded(31), &mut rng).unwrap();
    let gmr = Gmr::new(&gmm, vec![0], vec![1]).unwrap();
    for x in [-2.0, -1.5, 1.5, 2.5] {
        let out = gmr.regress(&[x]).unwrap();
        assert_approx_eq!(out.mean[0], -0.5 * x, 0.05);
        assert!(out.covariance.get(0, 0) >= 0.0);
    }
    assert!(!gmr.is_stale_for(&gmm));
}

#[test]
fn test_online_updates_track_shifted_data() {
    let mut rng = ModelRng::with_seed(2);
    let data = blobs(&mut rng, &[[0.0, 0.0]], 80, 0.3);
    let mut gmm = Gmm::new(1, 2);
    gmm.train(&data, &EmConfig::seeded(2), &mut rng).unwrap();
    let shifted = blobs(&mut rng, &[[2.0, 0.0]], 400, 0.3);
    for x in &shifted {
        gmm.update_online(x, 50).unwrap();
    }
    assert!((gmm.component(0).mean()[0] - 2.0).abs() < 0.2);
}
