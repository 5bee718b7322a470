//! Maximum mean discrepancy drift detector with a permutation test

use crate::config::MmdConfig;
use crate::kernel::{GaussianRbf, Kernel};
use drift_core::data::{ensure_finite, ensure_rows, vstack};
use drift_core::{
    distance_threshold, permutation_p_value, random_permutation, rng_from_seed, DefaultEngine,
    DetectorProperties, DriftDetector, DriftPrediction, Error, ExecutionEngine, Meta,
    PermutationTest, Reference, Result, SharedPreprocessor,
};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

/// Squared MMD from a pooled kernel matrix
///
/// `k` is the kernel matrix of `[x; y]` where the last `m` rows are the
/// test sample. With `perm`, pooled row `perm[i]` takes position `i`, so
/// the statistic is evaluated for a reassignment without building the
/// permuted matrix. Diagonal entries never contribute.
pub fn mmd2_from_kernel_matrix(
    k: &DMatrix<f64>,
    m: usize,
    perm: Option<&[usize]>,
) -> Result<f64> {
    let n_total = k.nrows();
    if k.ncols() != n_total {
        return Err(Error::InvalidInput("kernel matrix must be square".to_string()));
    }
    if m < 2 || n_total < m + 2 {
        return Err(Error::InsufficientData {
            expected: 2,
            actual: m.min(n_total.saturating_sub(m)),
        });
    }
    let n = n_total - m;

    // is_test[row] for every pooled row
    let mut is_test = vec![false; n_total];
    match perm {
        Some(p) => {
            if p.len() != n_total {
                return Err(Error::size_mismatch(n_total, p.len(), "permutation"));
            }
            let mut seen = vec![false; n_total];
            for (pos, &row) in p.iter().enumerate() {
                if row >= n_total || seen[row] {
                    return Err(Error::InvalidInput(format!(
                        "perm must be a permutation of 0..{n_total}, got index {row} at {pos}"
                    )));
                }
                seen[row] = true;
                is_test[row] = pos >= n;
            }
        }
        None => is_test[n..].iter_mut().for_each(|t| *t = true),
    }

    let (mut k_xx, mut k_yy, mut k_xy) = (0.0, 0.0, 0.0);
    for a in 0..n_total {
        for b in 0..n_total {
            if a == b {
                continue;
            }
            match (is_test[a], is_test[b]) {
                (false, false) => k_xx += k[(a, b)],
                (true, true) => k_yy += k[(a, b)],
                (false, true) => k_xy += k[(a, b)],
                (true, false) => {}
            }
        }
    }
    let (n, m) = (n as f64, m as f64);
    Ok(k_xx / (n * (n - 1.0)) + k_yy / (m * (m - 1.0)) - 2.0 * k_xy / (n * m))
}

/// Permutation test outcome for one test batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmdScore {
    pub p_val: f64,
    /// Squared MMD of the observed split
    pub distance: f64,
    /// Squared MMD above which drift would be flagged
    pub distance_threshold: f64,
}

/// Data section of an MMD drift prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MmdDriftData {
    pub is_drift: bool,
    /// The significance level
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_val: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    pub distance_threshold: f64,
}

impl fmt::Display for MmdDriftData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Drift: {}", self.is_drift)?;
        writeln!(f, "  Threshold: {:.4}", self.threshold)?;
        if let Some(p) = self.p_val {
            writeln!(f, "  p-value: {p:.4}")?;
        }
        if let Some(d) = self.distance {
            writeln!(f, "  MMD^2: {d:.6} (threshold {:.6})", self.distance_threshold)?;
        }
        Ok(())
    }
}

/// Kernel MMD drift detector
pub struct MmdDrift<K = GaussianRbf, E = DefaultEngine> {
    kernel: K,
    reference: Reference,
    permutation: PermutationTest<E>,
    config: MmdConfig,
    n_features: usize,
    meta: Meta,
    rng: StdRng,
}

impl MmdDrift<GaussianRbf, DefaultEngine> {
    /// Detector with a median-heuristic Gaussian RBF kernel and default settings
    pub fn new(x_ref: DMatrix<f64>) -> Result<Self> {
        Self::from_config(x_ref, MmdConfig::default())
    }

    pub fn from_config(x_ref: DMatrix<f64>, config: MmdConfig) -> Result<Self> {
        Self::with_preprocessor(x_ref, config, None)
    }

    pub fn with_preprocessor(
        x_ref: DMatrix<f64>,
        config: MmdConfig,
        preprocessor: Option<SharedPreprocessor>,
    ) -> Result<Self> {
        let kernel = GaussianRbf::from_sigma(config.sigma.clone())?;
        Self::with_kernel(x_ref, kernel, DefaultEngine::default(), config, preprocessor)
    }
}

impl<K: Kernel, E: ExecutionEngine> MmdDrift<K, E> {
    /// Detector with an explicit kernel and execution engine
    ///
    /// When `configure_kernel_from_x_ref` is set, kernel parameters still
    /// open are inferred once from the reference set in model space.
    pub fn with_kernel(
        x_ref: DMatrix<f64>,
        mut kernel: K,
        engine: E,
        config: MmdConfig,
        preprocessor: Option<SharedPreprocessor>,
    ) -> Result<Self> {
        config.validate()?;
        ensure_rows(&x_ref, 2)?;
        let permutation = PermutationTest::new(engine, config.n_permutations)?;
        let reference = Reference::new(
            x_ref,
            preprocessor,
            config.preprocess_at_init,
            config.update_x_ref,
        )?;

        let n_features = {
            let x_ref = reference.model_space()?;
            ensure_finite(&x_ref, "reference data")?;
            if config.configure_kernel_from_x_ref && kernel.requires_inference() {
                kernel.infer_parameters(&x_ref, &x_ref)?;
            }
            x_ref.ncols()
        };

        let meta = Meta::new("MmdDrift", config.data_type.clone());
        debug!(
            "MmdDrift over {} reference instances, {} permutations",
            reference.len(),
            config.n_permutations
        );
        Ok(Self {
            rng: rng_from_seed(config.seed),
            kernel,
            reference,
            permutation,
            config,
            n_features,
            meta,
        })
    }

    pub fn config(&self) -> &MmdConfig {
        &self.config
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn x_ref(&self) -> &DMatrix<f64> {
        self.reference.data()
    }

    /// `(p_val, mmd2, distance_threshold)` for `x`, without a decision
    #[instrument(skip(self, x), fields(n_ref = self.reference.len(), n = x.nrows()))]
    pub fn score(&mut self, x: &DMatrix<f64>) -> Result<(f64, f64, f64)> {
        let (x_ref, x) = self.reference.prepare(x)?;
        let score = permutation_test(
            &self.kernel,
            &self.permutation,
            &mut self.rng,
            self.n_features,
            self.config.p_val,
            &x_ref,
            &x,
        )?;
        Ok((score.p_val, score.distance, score.distance_threshold))
    }
}

fn permutation_test<K: Kernel, E: ExecutionEngine>(
    kernel: &K,
    permutation: &PermutationTest<E>,
    rng: &mut StdRng,
    n_features: usize,
    p_val: f64,
    x_ref: &DMatrix<f64>,
    x: &DMatrix<f64>,
) -> Result<MmdScore> {
    ensure_rows(x, 2)?;
    if x.ncols() != n_features {
        return Err(Error::size_mismatch(n_features, x.ncols(), "test batch features"));
    }
    ensure_finite(x, "test batch")?;

    let z = vstack(x_ref, x)?;
    let k = kernel.matrix(&z, &z)?;
    let m = x.nrows();
    let n_total = z.nrows();

    let distance = mmd2_from_kernel_matrix(&k, m, None)?;
    let permuted = permutation.run(rng, |perm_rng| {
        let perm = random_permutation(n_total, perm_rng);
        mmd2_from_kernel_matrix(&k, m, Some(&perm))
    })?;

    let score = MmdScore {
        p_val: permutation_p_value(distance, &permuted),
        distance,
        distance_threshold: distance_threshold(&permuted, p_val),
    };
    debug!(
        "MMD^2 {:.6}, p-value {:.4}, distance threshold {:.6}",
        score.distance, score.p_val, score.distance_threshold
    );
    Ok(score)
}

impl<K: Kernel, E: ExecutionEngine> DetectorProperties for MmdDrift<K, E> {
    fn name(&self) -> &'static str {
        "MmdDrift"
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn reference_size(&self) -> usize {
        self.reference.len()
    }
}

impl<K: Kernel, E: ExecutionEngine> DriftDetector for MmdDrift<K, E> {
    type Data = MmdDriftData;

    #[instrument(skip(self, x), fields(n_ref = self.reference.len(), n = x.nrows()))]
    fn predict(&mut self, x: &DMatrix<f64>) -> Result<DriftPrediction<MmdDriftData>> {
        let (score, processed) = {
            let (x_ref, processed) = self.reference.prepare(x)?;
            let score = permutation_test(
                &self.kernel,
                &self.permutation,
                &mut self.rng,
                self.n_features,
                self.config.p_val,
                &x_ref,
                &processed,
            )?;
            (score, processed.into_owned())
        };

        self.reference.update(x, &processed, &mut self.rng)?;

        let data = MmdDriftData {
            is_drift: score.p_val < self.config.p_val,
            threshold: self.config.p_val,
            p_val: self.config.return_p_val.then_some(score.p_val),
            distance: self.config.return_distance.then_some(score.distance),
            distance_threshold: score.distance_threshold,
        };
        Ok(DriftPrediction::new(self.meta.clone(), data))
    }
}
