//! Shared models and data generators for integration tests

use drift_core::Result;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// `n x d` matrix of independent N(mean, scale^2) draws
pub fn normal_matrix(n: usize, d: usize, mean: f64, scale: f64, seed: u64) -> DMatrix<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let dist = Normal::new(mean, scale).unwrap();
    DMatrix::from_fn(n, d, |_, _| dist.sample(&mut rng))
}

/// Linear logits, one class per feature
pub fn linear_logits(x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    Ok(x * 4.0)
}

/// Binary classifier returning the positive-class probability only
pub fn sigmoid_classifier(x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    Ok(DMatrix::from_fn(x.nrows(), 1, |i, _| {
        1.0 / (1.0 + (-4.0 * x[(i, 0)]).exp())
    }))
}

/// Dropout-like regressor: noise scales with the second feature
pub fn noisy_regressor(x: &DMatrix<f64>, rng: &mut StdRng) -> Result<DVector<f64>> {
    let noise = Normal::new(0.0, 1.0).unwrap();
    Ok(DVector::from_fn(x.nrows(), |i, _| {
        x[(i, 0)] + x[(i, 1)].abs() * noise.sample(rng)
    }))
}
