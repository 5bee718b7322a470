//! Shared data generators for integration tests

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// `n x d` matrix of independent N(mean, 1) draws
pub fn normal_matrix(n: usize, d: usize, mean: f64, seed: u64) -> DMatrix<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let dist = Normal::new(mean, 1.0).unwrap();
    DMatrix::from_fn(n, d, |_, _| dist.sample(&mut rng))
}

/// Single categorical column drawn with the given category weights
pub fn categorical_column(n: usize, weights: &[f64], seed: u64) -> Vec<f64> {
    use rand::Rng;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let total: f64 = weights.iter().sum();
    (0..n)
        .map(|_| {
            let mut u = rng.gen::<f64>() * total;
            for (c, &w) in weights.iter().enumerate() {
                if u < w {
                    return c as f64;
                }
                u -= w;
            }
            (weights.len() - 1) as f64
        })
        .collect()
}
