//! Shared data generators for integration tests

use nalgebra::DMatrix;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// `n x d` matrix of independent N(mean, 1) draws
pub fn normal_matrix(n: usize, d: usize, mean: f64, seed: u64) -> DMatrix<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let dist = Normal::new(mean, 1.0).unwrap();
    DMatrix::from_fn(n, d, |_, _| dist.sample(&mut rng))
}

/// Contexts uniform on `[lo, hi)` and data `x = c + offset + 0.1 * noise`
pub fn conditional_sample(
    n: usize,
    lo: f64,
    hi: f64,
    offset: f64,
    seed: u64,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.1).unwrap();
    let c: Vec<f64> = (0..n).map(|_| rng.gen_range(lo..hi)).collect();
    let x: Vec<f64> = c.iter().map(|&v| v + offset + noise.sample(&mut rng)).collect();
    (
        DMatrix::from_column_slice(n, 1, &x),
        DMatrix::from_column_slice(n, 1, &c),
    )
}
