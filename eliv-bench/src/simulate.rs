//! Synthetic linear IV designs.

use anyhow::{Context, Result};
use eliv_core::ObservationSet;
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// Exactly identified design: x = z ~ N(0, I), y = x β + N(0, 1).
pub fn exactly_identified(n: usize, beta_true: &[f64], seed: u64) -> Result<ObservationSet> {
    let p = beta_true.len();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let x: DMatrix<f64> = DMatrix::from_fn(n, p, |_, _| StandardNormal.sample(&mut rng));
    let y: Vec<f64> = (0..n)
        .map(|i| {
            let e: f64 = StandardNormal.sample(&mut rng);
            x.row(i).iter().zip(beta_true).map(|(a, b)| a * b).sum::<f64>() + e
        })
        .collect();

    ObservationSet::new(y, x.clone(), x)
        .with_context(|| format!("Failed to build design with n={} p={}", n, p))
}
