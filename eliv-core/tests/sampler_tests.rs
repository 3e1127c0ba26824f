//! End-to-end tests of the Metropolis-Hastings sampler on simulated IV data.

use eliv_core::{
    run_metropolis_chain, solve_calibration_weights, CalibrationSettings, ObservationSet, PriorSpec,
    SamplerSettings,
};
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// Exactly identified design: x = z ~ N(0, I₂), y = x β_true + N(0, 1).
fn simulate(n: usize, beta_true: [f64; 2], seed: u64) -> ObservationSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x: DMatrix<f64> = DMatrix::from_fn(n, 2, |_, _| StandardNormal.sample(&mut rng));
    let y: Vec<f64> = (0..n)
        .map(|i| {
            let e: f64 = StandardNormal.sample(&mut rng);
            x[(i, 0)] * beta_true[0] + x[(i, 1)] * beta_true[1] + e
        })
        .collect();
    ObservationSet::new(y, x.clone(), x).unwrap()
}

#[test]
fn test_flat_prior_recovers_coefficients() {
    let data = simulate(500, [1.0, 1.0], 2023);
    let settings = SamplerSettings::flat_prior().with_nu(0.05).with_chain(3500, 3000);
    let mut rng = ChaCha8Rng::seed_from_u64(17);

    let res = run_metropolis_chain(&[0.0, 0.0], &data, &settings, &mut rng).unwrap();

    assert_eq!(res.history.len(), 3501);
    for (j, m) in res.summary.mean.iter().enumerate() {
        assert!((m - 1.0).abs() < 0.25, "posterior mean[{}] = {}", j, m);
    }
    // The fixed step is large for n = 500, so acceptance sits near 4%.
    let acc = res.summary.acceptance_rate;
    assert!(acc > 0.02 && acc < 0.5, "acceptance rate {}", acc);
    assert!(res.unconverged < 175, "{} unconverged calibrations", res.unconverged);
}

#[test]
fn test_chain_runs_from_any_start_calibration() {
    // At β₀ = (0, 0) this design's calibration can stop just short of the gap
    // target; the chain still starts from the best-effort multiplier.
    let data = simulate(500, [1.0, 1.0], 2);
    let settings = SamplerSettings::flat_prior().with_nu(0.05).with_chain(40, 20);
    let mut rng = ChaCha8Rng::seed_from_u64(3);

    let res = run_metropolis_chain(&[0.0, 0.0], &data, &settings, &mut rng).unwrap();
    assert_eq!(res.history.len(), 41);
    assert_eq!(res.history[0], vec![0.0, 0.0]);
    assert!(res.final_state.potential.is_finite());
    assert!(res.summary.mean.iter().all(|m| m.is_finite()));
    if !res.initial_status.is_solved() {
        let gee = data.moment_matrix(&[0.0, 0.0]).unwrap();
        let cal = solve_calibration_weights(&gee, 0.05, &settings.calibration).unwrap();
        assert_eq!(cal.status, res.initial_status);
    }
}

#[test]
fn test_all_presets_run() {
    let data = simulate(300, [1.0, 1.0], 99);
    let presets = [
        SamplerSettings::shifted_prior(2),
        SamplerSettings::centered_prior(2),
        SamplerSettings::flat_prior(),
    ];

    for (k, preset) in presets.into_iter().enumerate() {
        let settings = preset.with_chain(300, 200);
        let mut rng = ChaCha8Rng::seed_from_u64(k as u64);
        let res = run_metropolis_chain(&[1.0, 1.0], &data, &settings, &mut rng).unwrap();

        assert_eq!(res.history.len(), 301);
        assert!(res.summary.mean.iter().all(|m| m.is_finite()));
        assert!((0.0..=1.0).contains(&res.summary.acceptance_rate));
        assert!(res.final_state.potential.is_finite());
        for draw in &res.history {
            assert!(draw.iter().all(|b| b.abs() <= settings.proposal_bound));
        }
    }
}

#[test]
fn test_potential_minimized_near_truth() {
    // The calibrated dual energy is smallest near the true coefficients.
    let data = simulate(400, [1.0, 1.0], 5);
    let nu = 0.05;
    let settings = CalibrationSettings::default();
    let energy = |beta: &[f64]| {
        let gee = data.moment_matrix(beta).unwrap();
        let cal = solve_calibration_weights(&gee, nu, &settings).unwrap();
        assert!(cal.status.is_solved());
        eliv_core::objective::potential(beta, &cal.lambda, &gee, nu, &PriorSpec::Flat)
    };

    let at_truth = energy(&[1.0, 1.0]);
    for beta in [[0.0, 0.0], [1.5, 1.0], [1.0, 0.4], [2.0, -1.0]] {
        assert!(energy(&beta) > at_truth, "U({:?}) <= U(truth)", beta);
    }
}
