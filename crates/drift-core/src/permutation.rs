//! Permutation test machinery
//!
//! Each permutation gets its own `StdRng` seeded from a base seed plus the
//! permutation index, so results are identical across execution engines.

use crate::execution::ExecutionEngine;
use crate::{Error, Result};
use rand::prelude::*;
use tracing::debug;

/// Runs a statistic over `n_permutations` independently seeded resamples
#[derive(Clone, Debug)]
pub struct PermutationTest<E> {
    engine: E,
    n_permutations: usize,
}

impl<E: ExecutionEngine> PermutationTest<E> {
    pub fn new(engine: E, n_permutations: usize) -> Result<Self> {
        if n_permutations == 0 {
            return Err(Error::InvalidParameter(
                "n_permutations must be positive".to_string(),
            ));
        }
        Ok(Self {
            engine,
            n_permutations,
        })
    }

    pub fn n_permutations(&self) -> usize {
        self.n_permutations
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Evaluate `statistic` once per permutation
    ///
    /// The closure receives a fresh RNG for its permutation.
    pub fn run<R, F>(&self, rng: &mut R, statistic: F) -> Result<Vec<f64>>
    where
        R: Rng + ?Sized,
        F: Fn(&mut StdRng) -> Result<f64> + Sync + Send,
    {
        let base_seed: u64 = rng.gen();
        debug!(
            "Running {} permutations on {:?} engine",
            self.n_permutations,
            self.engine.strategy()
        );
        self.engine.try_execute_batch(self.n_permutations, |i| {
            let mut perm_rng = StdRng::seed_from_u64(base_seed.wrapping_add(i as u64));
            statistic(&mut perm_rng)
        })
    }
}

/// Fraction of permuted statistics at least as large as the observed one
pub fn permutation_p_value(observed: f64, permuted: &[f64]) -> f64 {
    if permuted.is_empty() {
        return 1.0;
    }
    let exceed = permuted.iter().filter(|&&s| observed <= s).count();
    exceed as f64 / permuted.len() as f64
}

/// Statistic value above which drift would be flagged at level `p_val`
///
/// Takes the permuted statistics in descending order and picks index
/// `floor(p_val * len)`.
pub fn distance_threshold(permuted: &[f64], p_val: f64) -> f64 {
    if permuted.is_empty() {
        return f64::NAN;
    }
    let mut sorted = permuted.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let idx = ((p_val * sorted.len() as f64) as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Detector RNG: seeded when a seed is given, from entropy otherwise
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    let seed = seed.unwrap_or_else(|| thread_rng().gen());
    StdRng::seed_from_u64(seed)
}

/// Uniform random permutation of `0..n`
pub fn random_permutation<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(rng);
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::SequentialEngine;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_p_value_counts_ties() {
        assert_eq!(permutation_p_value(0.5, &[0.1, 0.5, 0.9, 0.2]), 0.5);
        assert_eq!(permutation_p_value(1.0, &[0.1, 0.2]), 0.0);
        assert_eq!(permutation_p_value(0.0, &[]), 1.0);
    }

    #[test]
    fn test_distance_threshold_descending_index() {
        let permuted: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        // descending: 100, 99, ... index 5 -> 95
        assert_eq!(distance_threshold(&permuted, 0.05), 95.0);
        assert_eq!(distance_threshold(&[3.0], 0.99), 3.0);
    }

    #[test]
    fn test_run_is_reproducible() {
        let test = PermutationTest::new(SequentialEngine, 20).unwrap();
        let stat = |rng: &mut StdRng| -> Result<f64> { Ok(rng.gen::<f64>()) };

        let a = test.run(&mut ChaCha8Rng::seed_from_u64(3), stat).unwrap();
        let b = test.run(&mut ChaCha8Rng::seed_from_u64(3), stat).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn test_zero_permutations_rejected() {
        assert!(PermutationTest::new(SequentialEngine, 0).is_err());
    }

    #[test]
    fn test_random_permutation_is_permutation() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut perm = random_permutation(50, &mut rng);
        perm.sort_unstable();
        assert_eq!(perm, (0..50).collect::<Vec<_>>());
    }
}
