//! Context-aware MMD drift detection
//!
//! Tests whether the distribution of `x` given a context `c` differs between
//! the reference and the test sample, while allowing the context
//! distribution itself to change. Conditional mean embeddings of both
//! samples are compared at a held-out set of test contexts, and the null
//! distribution is simulated by redrawing the sample labels from a
//! context-based propensity model.

use crate::config::ContextMmdConfig;
use crate::kernel::{GaussianRbf, Kernel};
use drift_core::data::{ensure_finite, ensure_rows, select_block, select_rows, to_rows, vstack};
use drift_core::{
    distance_threshold, permutation_p_value, random_permutation, rng_from_seed, DefaultEngine,
    DetectorProperties, DriftPrediction, Error, ExecutionEngine, Meta, PermutationTest, Reference,
    Result, SharedPreprocessor,
};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument, warn};

/// Regularisation candidates `2^-i`
const LAMBDA_GRID_SIZE: i32 = 20;

/// Attempts at drawing a label assignment with both groups populated
const MAX_REDRAWS: usize = 100;

/// Estimates `P(test | c)` for every pooled instance
pub trait DomainClassifier: Send + Sync {
    /// `c` holds the pooled contexts `[c_ref; c]`, `l` their kernel matrix
    /// and `is_test` the observed sample labels.
    fn propensity(&self, c: &DMatrix<f64>, l: &DMatrix<f64>, is_test: &[bool]) -> Result<Vec<f64>>;
}

/// Leave-one-out Nadaraya-Watson estimate of the test label under the context kernel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelSmoother {
    clip: f64,
}

impl Default for KernelSmoother {
    fn default() -> Self {
        Self { clip: 1e-3 }
    }
}

impl KernelSmoother {
    /// Propensities are clipped to `[clip, 1 - clip]`
    pub fn new(clip: f64) -> Result<Self> {
        if !(clip > 0.0 && clip < 0.5) {
            return Err(Error::InvalidParameter(format!(
                "clip must be in (0, 0.5), got {clip}"
            )));
        }
        Ok(Self { clip })
    }
}

impl DomainClassifier for KernelSmoother {
    fn propensity(
        &self,
        _c: &DMatrix<f64>,
        l: &DMatrix<f64>,
        is_test: &[bool],
    ) -> Result<Vec<f64>> {
        let n = is_test.len();
        if l.nrows() != n || l.ncols() != n {
            return Err(Error::size_mismatch(n, l.nrows(), "context kernel matrix"));
        }
        let prior = is_test.iter().filter(|&&t| t).count() as f64 / n.max(1) as f64;
        Ok((0..n)
            .map(|i| {
                let (mut num, mut den) = (0.0, 0.0);
                for j in (0..n).filter(|&j| j != i) {
                    den += l[(i, j)];
                    if is_test[j] {
                        num += l[(i, j)];
                    }
                }
                let p = if den > 0.0 { num / den } else { prior };
                p.clamp(self.clip, 1.0 - self.clip)
            })
            .collect())
    }
}

/// Pluggable parts of a context-aware detector
#[derive(Debug, Clone)]
pub struct ContextComponents<K, C, E> {
    pub x_kernel: K,
    pub c_kernel: K,
    pub classifier: C,
    pub engine: E,
}

impl ContextComponents<GaussianRbf, KernelSmoother, DefaultEngine> {
    /// RBF kernels with the configured (or inferred) bandwidths
    pub fn from_config(config: &ContextMmdConfig) -> Result<Self> {
        Ok(Self {
            x_kernel: GaussianRbf::from_sigma(config.x_sigma.clone())?,
            c_kernel: GaussianRbf::from_sigma(config.c_sigma.clone())?,
            classifier: KernelSmoother::default(),
            engine: DefaultEngine::default(),
        })
    }
}

/// Weight matrices the statistic places over instance pairs
#[derive(Debug, Clone, PartialEq)]
pub struct Couplings {
    /// reference x reference
    pub xx: DMatrix<f64>,
    /// test x test
    pub yy: DMatrix<f64>,
    /// reference x test
    pub xy: DMatrix<f64>,
}

/// Outcome of one context-aware permutation test
#[derive(Debug, Clone, PartialEq)]
pub struct ContextMmdScore {
    pub p_val: f64,
    /// Conditional MMD of the observed split
    pub distance: f64,
    pub distance_threshold: f64,
    /// Regularisation used for `(reference, test)`
    pub lams: (f64, f64),
    pub couplings: Option<Couplings>,
}

/// Data section of a context-aware MMD prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMmdDriftData {
    pub is_drift: bool,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_val: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    pub distance_threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupling_xx: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupling_yy: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupling_xy: Option<Vec<Vec<f64>>>,
}

impl fmt::Display for ContextMmdDriftData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Drift: {}", self.is_drift)?;
        writeln!(f, "  Threshold: {:.4}", self.threshold)?;
        if let Some(p) = self.p_val {
            writeln!(f, "  p-value: {p:.4}")?;
        }
        if let Some(d) = self.distance {
            writeln!(f, "  Conditional MMD: {d:.6} (threshold {:.6})", self.distance_threshold)?;
        }
        if let Some(xx) = &self.coupling_xx {
            writeln!(f, "  Couplings: {} reference instances", xx.len())?;
        }
        Ok(())
    }
}

/// Indices of the reference (`false`) and test (`true`) instances
fn split_labels(is_test: &[bool]) -> (Vec<usize>, Vec<usize>) {
    (0..is_test.len()).partition(|&i| !is_test[i])
}

/// `l_held[:, idx] (L[idx, idx] + n lam I)^-1`
fn embedding_weights(
    l: &DMatrix<f64>,
    l_held: &DMatrix<f64>,
    idx: &[usize],
    lam: f64,
) -> Result<DMatrix<f64>> {
    let n = idx.len();
    let a = select_block(l, idx, idx) + DMatrix::identity(n, n) * (n as f64 * lam);
    let held: Vec<usize> = (0..l_held.nrows()).collect();
    let l_h = select_block(l_held, &held, idx);
    let chol = a.cholesky().ok_or_else(|| {
        Error::Computation("regularised context kernel is not positive definite".to_string())
    })?;
    Ok(chol.solve(&l_h.transpose()).transpose())
}

/// Conditional MMD for one labelling of the pooled sample
pub fn conditional_mmd(
    k: &DMatrix<f64>,
    l: &DMatrix<f64>,
    l_held: &DMatrix<f64>,
    is_test: &[bool],
    lams: (f64, f64),
    with_couplings: bool,
) -> Result<(f64, Option<Couplings>)> {
    let (idx_0, idx_1) = split_labels(is_test);
    if idx_0.len() < 2 || idx_1.len() < 2 {
        return Err(Error::InsufficientData {
            expected: 2,
            actual: idx_0.len().min(idx_1.len()),
        });
    }
    let n_held = l_held.nrows() as f64;
    let w_0 = embedding_weights(l, l_held, &idx_0, lams.0)?;
    let w_1 = embedding_weights(l, l_held, &idx_1, lams.1)?;
    let k_00 = select_block(k, &idx_0, &idx_0);
    let k_11 = select_block(k, &idx_1, &idx_1);
    let k_01 = select_block(k, &idx_0, &idx_1);

    // sum(C o K) with C = W_a^T W_b / n_held, without forming C
    let sim_xx = (&w_0 * &k_00).component_mul(&w_0).sum() / n_held;
    let sim_yy = (&w_1 * &k_11).component_mul(&w_1).sum() / n_held;
    let sim_xy = (&w_0 * &k_01).component_mul(&w_1).sum() / n_held;
    let stat = sim_xx + sim_yy - 2.0 * sim_xy;

    let couplings = with_couplings.then(|| Couplings {
        xx: w_0.transpose() * &w_0 / n_held,
        yy: w_1.transpose() * &w_1 / n_held,
        xy: w_0.transpose() * &w_1 / n_held,
    });
    Ok((stat, couplings))
}

/// Cross-validated regularisation strength for one sample
///
/// Minimises the out-of-fold conditional mean embedding error
/// `tr(K_oo) - 2 tr(W K_oi^T) + tr(W K_ii W^T)` over `2^-i`.
pub fn select_lambda<R: Rng + ?Sized>(
    k: &DMatrix<f64>,
    l: &DMatrix<f64>,
    n_folds: usize,
    rng: &mut R,
) -> Result<f64> {
    let n = l.nrows();
    if n < 2 {
        return Err(Error::InsufficientData { expected: 2, actual: n });
    }
    let n_folds = n_folds.clamp(2, n);
    let fold_size = n / n_folds;
    let perm = random_permutation(n, rng);
    let grid: Vec<f64> = (0..LAMBDA_GRID_SIZE).map(|i| 2f64.powi(-i)).collect();
    let mut losses = vec![0.0; grid.len()];

    for fold in 0..n_folds {
        let oos = &perm[fold * fold_size..(fold + 1) * fold_size];
        let ins: Vec<usize> = perm[..fold * fold_size]
            .iter()
            .chain(&perm[(fold + 1) * fold_size..])
            .copied()
            .collect();
        let n_in = ins.len();
        let k_oo_trace: f64 = oos.iter().map(|&i| k[(i, i)]).sum();
        let k_oi = select_block(k, oos, &ins);
        let k_ii = select_block(k, &ins, &ins);
        let l_oi = select_block(l, oos, &ins);
        let l_ii = select_block(l, &ins, &ins);

        for (loss, &lam) in losses.iter_mut().zip(&grid) {
            let a = &l_ii + DMatrix::identity(n_in, n_in) * (n_in as f64 * lam);
            let chol = a.cholesky().ok_or_else(|| {
                Error::Computation(format!("context kernel not positive definite at lambda {lam}"))
            })?;
            let w = chol.solve(&l_oi.transpose()).transpose();
            *loss += k_oo_trace - 2.0 * w.component_mul(&k_oi).sum()
                + (&w * &k_ii).component_mul(&w).sum();
        }
    }

    let (best, _) = losses
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .ok_or_else(|| Error::Computation("empty regularisation grid".to_string()))?;
    Ok(grid[best])
}

/// Draw test labels from the propensities, keeping both groups at two or more
fn redraw_labels<R: Rng + ?Sized>(prop: &[f64], rng: &mut R) -> Result<Vec<bool>> {
    for attempt in 0..MAX_REDRAWS {
        let labels: Vec<bool> = prop.iter().map(|&p| rng.gen::<f64>() < p).collect();
        let n_test = labels.iter().filter(|&&t| t).count();
        if n_test >= 2 && labels.len() - n_test >= 2 {
            return Ok(labels);
        }
        if attempt == 0 {
            warn!("Degenerate label redraw ({n_test} of {} test), retrying", labels.len());
        }
    }
    Err(Error::Computation(format!(
        "no usable label assignment after {MAX_REDRAWS} redraws"
    )))
}

/// Borrowed state of one test run
struct ContextTest<'a, K, C, E> {
    x_kernel: &'a K,
    c_kernel: &'a K,
    classifier: &'a C,
    permutation: &'a PermutationTest<E>,
    config: &'a ContextMmdConfig,
}

impl<K: Kernel, C: DomainClassifier, E: ExecutionEngine> ContextTest<'_, K, C, E> {
    fn run(
        &self,
        x_ref: &DMatrix<f64>,
        c_ref: &DMatrix<f64>,
        x: &DMatrix<f64>,
        c: &DMatrix<f64>,
        rng: &mut StdRng,
    ) -> Result<ContextMmdScore> {
        let n_test = x.nrows();
        let n_held = (n_test as f64 * self.config.prop_c_held).floor() as usize;
        if n_held < 1 || n_test - n_held < 2 {
            return Err(Error::InvalidInput(format!(
                "{n_test} test instances leave {n_held} held-out contexts and {} test rows",
                n_test - n_held
            )));
        }

        // Hold out test contexts to condition on
        let order = random_permutation(n_test, rng);
        let (held, kept) = order.split_at(n_held);
        let mut kept = kept.to_vec();
        kept.sort_unstable();
        let c_held = select_rows(c, held);
        let x = select_rows(x, &kept);
        let c = select_rows(c, &kept);

        let n_ref = x_ref.nrows();
        let x_all = vstack(x_ref, &x)?;
        let c_all = vstack(c_ref, &c)?;
        let k = self.x_kernel.matrix(&x_all, &x_all)?;
        let l = self.c_kernel.matrix(&c_all, &c_all)?;
        let l_held = self.c_kernel.matrix(&c_held, &c_all)?;
        let is_test: Vec<bool> = (0..x_all.nrows()).map(|i| i >= n_ref).collect();

        let lams = match self.config.lams {
            Some(lams) => lams,
            None => {
                let (idx_0, idx_1) = split_labels(&is_test);
                let lam_0 = select_lambda(
                    &select_block(&k, &idx_0, &idx_0),
                    &select_block(&l, &idx_0, &idx_0),
                    self.config.n_folds,
                    rng,
                )?;
                let lam_1 = select_lambda(
                    &select_block(&k, &idx_1, &idx_1),
                    &select_block(&l, &idx_1, &idx_1),
                    self.config.n_folds,
                    rng,
                )?;
                (lam_0, lam_1)
            }
        };
        debug!("Regularisation: reference {:.3e}, test {:.3e}", lams.0, lams.1);

        let prop = self.classifier.propensity(&c_all, &l, &is_test)?;
        if prop.len() != is_test.len() {
            return Err(Error::size_mismatch(is_test.len(), prop.len(), "propensity scores"));
        }
        if prop.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(Error::Model("propensity scores must lie in [0, 1]".to_string()));
        }

        let (distance, couplings) =
            conditional_mmd(&k, &l, &l_held, &is_test, lams, self.config.return_coupling)?;
        let permuted = self.permutation.run(rng, |perm_rng| {
            let labels = redraw_labels(&prop, perm_rng)?;
            conditional_mmd(&k, &l, &l_held, &labels, lams, false).map(|(stat, _)| stat)
        })?;

        let score = ContextMmdScore {
            p_val: permutation_p_value(distance, &permuted),
            distance,
            distance_threshold: distance_threshold(&permuted, self.config.p_val),
            lams,
            couplings,
        };
        debug!(
            "Conditional MMD {:.6}, p-value {:.4}, distance threshold {:.6}",
            score.distance, score.p_val, score.distance_threshold
        );
        Ok(score)
    }
}

/// Context-aware kernel MMD drift detector
pub struct ContextMmdDrift<K = GaussianRbf, C = KernelSmoother, E = DefaultEngine> {
    x_kernel: K,
    c_kernel: K,
    classifier: C,
    permutation: PermutationTest<E>,
    reference: Reference,
    c_ref: DMatrix<f64>,
    config: ContextMmdConfig,
    n_features: usize,
    meta: Meta,
    rng: StdRng,
}

impl ContextMmdDrift<GaussianRbf, KernelSmoother, DefaultEngine> {
    pub fn new(x_ref: DMatrix<f64>, c_ref: DMatrix<f64>) -> Result<Self> {
        Self::from_config(x_ref, c_ref, ContextMmdConfig::default())
    }

    pub fn from_config(
        x_ref: DMatrix<f64>,
        c_ref: DMatrix<f64>,
        config: ContextMmdConfig,
    ) -> Result<Self> {
        Self::with_preprocessor(x_ref, c_ref, config, None)
    }

    pub fn with_preprocessor(
        x_ref: DMatrix<f64>,
        c_ref: DMatrix<f64>,
        config: ContextMmdConfig,
        preprocessor: Option<SharedPreprocessor>,
    ) -> Result<Self> {
        let components = ContextComponents::from_config(&config)?;
        Self::with_components(x_ref, c_ref, components, config, preprocessor)
    }
}

impl<K: Kernel, C: DomainClassifier, E: ExecutionEngine> ContextMmdDrift<K, C, E> {
    /// Detector with explicit kernels, domain classifier and engine
    ///
    /// Open kernel parameters are inferred from the reference data and
    /// contexts. The preprocessor applies to `x` only.
    pub fn with_components(
        x_ref: DMatrix<f64>,
        c_ref: DMatrix<f64>,
        components: ContextComponents<K, C, E>,
        config: ContextMmdConfig,
        preprocessor: Option<SharedPreprocessor>,
    ) -> Result<Self> {
        config.validate()?;
        ensure_rows(&x_ref, 2)?;
        if c_ref.nrows() != x_ref.nrows() {
            return Err(Error::size_mismatch(x_ref.nrows(), c_ref.nrows(), "reference contexts"));
        }
        ensure_finite(&c_ref, "reference contexts")?;

        let ContextComponents {
            mut x_kernel,
            mut c_kernel,
            classifier,
            engine,
        } = components;
        let permutation = PermutationTest::new(engine, config.n_permutations)?;
        let reference = Reference::new(
            x_ref,
            preprocessor,
            config.preprocess_at_init,
            config.update_ref,
        )?;

        let n_features = {
            let x_ref = reference.model_space()?;
            ensure_finite(&x_ref, "reference data")?;
            if x_kernel.requires_inference() {
                x_kernel.infer_parameters(&x_ref, &x_ref)?;
            }
            x_ref.ncols()
        };
        if c_kernel.requires_inference() {
            c_kernel.infer_parameters(&c_ref, &c_ref)?;
        }

        let meta = Meta::new("ContextMmdDrift", config.data_type.clone());
        debug!(
            "ContextMmdDrift over {} reference instances, {} context features",
            reference.len(),
            c_ref.ncols()
        );
        Ok(Self {
            rng: rng_from_seed(config.seed),
            x_kernel,
            c_kernel,
            classifier,
            permutation,
            reference,
            c_ref,
            config,
            n_features,
            meta,
        })
    }

    pub fn config(&self) -> &ContextMmdConfig {
        &self.config
    }

    pub fn x_ref(&self) -> &DMatrix<f64> {
        self.reference.data()
    }

    pub fn c_ref(&self) -> &DMatrix<f64> {
        &self.c_ref
    }

    pub fn x_kernel(&self) -> &K {
        &self.x_kernel
    }

    pub fn c_kernel(&self) -> &K {
        &self.c_kernel
    }

    fn check_batch(&self, x: &DMatrix<f64>, c: &DMatrix<f64>) -> Result<()> {
        if x.nrows() != c.nrows() {
            return Err(Error::size_mismatch(x.nrows(), c.nrows(), "test contexts"));
        }
        if c.ncols() != self.c_ref.ncols() {
            return Err(Error::size_mismatch(self.c_ref.ncols(), c.ncols(), "context features"));
        }
        ensure_finite(c, "test contexts")
    }

    fn check_model_space(&self, x: &DMatrix<f64>) -> Result<()> {
        if x.ncols() != self.n_features {
            return Err(Error::size_mismatch(self.n_features, x.ncols(), "test batch features"));
        }
        ensure_finite(x, "test batch")
    }

    /// Run the test on `(x, c)` without taking a decision
    #[instrument(skip(self, x, c), fields(n_ref = self.reference.len(), n = x.nrows()))]
    pub fn score(&mut self, x: &DMatrix<f64>, c: &DMatrix<f64>) -> Result<ContextMmdScore> {
        self.check_batch(x, c)?;
        let (x_ref, x) = self.reference.prepare(x)?;
        self.check_model_space(&x)?;
        let test = ContextTest {
            x_kernel: &self.x_kernel,
            c_kernel: &self.c_kernel,
            classifier: &self.classifier,
            permutation: &self.permutation,
            config: &self.config,
        };
        test.run(&x_ref, &self.c_ref, &x, c, &mut self.rng)
    }

    /// Test `(x, c)` for conditional drift and fold it into the reference
    #[instrument(skip(self, x, c), fields(n_ref = self.reference.len(), n = x.nrows()))]
    pub fn predict(
        &mut self,
        x: &DMatrix<f64>,
        c: &DMatrix<f64>,
    ) -> Result<DriftPrediction<ContextMmdDriftData>> {
        self.check_batch(x, c)?;
        let (score, processed) = {
            let (x_ref, processed) = self.reference.prepare(x)?;
            self.check_model_space(&processed)?;
            let test = ContextTest {
                x_kernel: &self.x_kernel,
                c_kernel: &self.c_kernel,
                classifier: &self.classifier,
                permutation: &self.permutation,
                config: &self.config,
            };
            let score = test.run(&x_ref, &self.c_ref, &processed, c, &mut self.rng)?;
            (score, processed.into_owned())
        };

        self.reference
            .update_paired(x, &processed, &mut self.c_ref, c, &mut self.rng)?;

        let (coupling_xx, coupling_yy, coupling_xy) = match &score.couplings {
            Some(cp) => (Some(to_rows(&cp.xx)), Some(to_rows(&cp.yy)), Some(to_rows(&cp.xy))),
            None => (None, None, None),
        };
        let data = ContextMmdDriftData {
            is_drift: score.p_val < self.config.p_val,
            threshold: self.config.p_val,
            p_val: self.config.return_p_val.then_some(score.p_val),
            distance: self.config.return_distance.then_some(score.distance),
            distance_threshold: score.distance_threshold,
            coupling_xx,
            coupling_yy,
            coupling_xy,
        };
        Ok(DriftPrediction::new(self.meta.clone(), data))
    }
}

impl<K: Kernel, C: DomainClassifier, E: ExecutionEngine> DetectorProperties
    for ContextMmdDrift<K, C, E>
{
    fn name(&self) -> &'static str {
        "ContextMmdDrift"
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn reference_size(&self) -> usize {
        self.reference.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use drift_core::data::column_matrix;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn line(n: usize, lo: f64, hi: f64) -> DMatrix<f64> {
        let step = (hi - lo) / (n - 1) as f64;
        column_matrix(&(0..n).map(|i| lo + step * i as f64).collect::<Vec<_>>())
    }

    #[test]
    fn test_kernel_smoother_separates_domains() {
        let c = vstack(&line(10, 0.0, 1.0), &line(10, 10.0, 11.0)).unwrap();
        let l = GaussianRbf::new(vec![1.0]).unwrap().matrix(&c, &c).unwrap();
        let is_test: Vec<bool> = (0..20).map(|i| i >= 10).collect();
        let prop = KernelSmoother::default().propensity(&c, &l, &is_test).unwrap();

        assert!(prop[..10].iter().all(|&p| p < 0.01));
        assert!(prop[10..].iter().all(|&p| p > 0.99));
        assert!(prop.iter().all(|&p| (1e-3..=1.0 - 1e-3).contains(&p)));
    }

    #[test]
    fn test_kernel_smoother_mixed_domains_near_half() {
        let c = line(40, 0.0, 1.0);
        let l = GaussianRbf::new(vec![5.0]).unwrap().matrix(&c, &c).unwrap();
        let is_test: Vec<bool> = (0..40).map(|i| i % 2 == 1).collect();
        let prop = KernelSmoother::default().propensity(&c, &l, &is_test).unwrap();
        assert!(prop.iter().all(|&p| (p - 0.5).abs() < 0.05));
    }

    #[test]
    fn test_conditional_mmd_zero_for_identical_halves() {
        // Reference and test are the same points, so the embeddings coincide
        let base = line(8, 0.0, 1.0);
        let x_all = vstack(&base, &base).unwrap();
        let kernel = GaussianRbf::new(vec![0.5]).unwrap();
        let k = kernel.matrix(&x_all, &x_all).unwrap();
        let l = k.clone();
        let l_held = kernel.matrix(&line(3, 0.2, 0.8), &x_all).unwrap();
        let is_test: Vec<bool> = (0..16).map(|i| i >= 8).collect();

        let (stat, couplings) =
            conditional_mmd(&k, &l, &l_held, &is_test, (0.1, 0.1), true).unwrap();
        assert_abs_diff_eq!(stat, 0.0, epsilon = 1e-10);

        let couplings = couplings.unwrap();
        assert_eq!(couplings.xx.shape(), (8, 8));
        assert_eq!(couplings.xy.shape(), (8, 8));
        assert_abs_diff_eq!(couplings.xx, couplings.xy, epsilon = 1e-12);
    }

    #[test]
    fn test_conditional_mmd_positive_for_shifted_test() {
        let c = line(8, 0.0, 1.0);
        let c_all = vstack(&c, &c).unwrap();
        let x_all = vstack(&c, &c.map(|v| v + 2.0)).unwrap();
        let kernel = GaussianRbf::new(vec![0.5]).unwrap();
        let k = kernel.matrix(&x_all, &x_all).unwrap();
        let l = kernel.matrix(&c_all, &c_all).unwrap();
        let l_held = kernel.matrix(&line(3, 0.2, 0.8), &c_all).unwrap();
        let is_test: Vec<bool> = (0..16).map(|i| i >= 8).collect();

        let (stat, couplings) =
            conditional_mmd(&k, &l, &l_held, &is_test, (0.1, 0.1), false).unwrap();
        assert!(stat > 0.1);
        assert!(couplings.is_none());
    }

    #[test]
    fn test_conditional_mmd_requires_two_per_group() {
        let k = DMatrix::identity(4, 4);
        let l_held = DMatrix::from_element(1, 4, 0.5);
        let labels = [false, true, true, true];
        assert!(conditional_mmd(&k, &k, &l_held, &labels, (0.1, 0.1), false).is_err());
    }

    #[test]
    fn test_select_lambda_from_grid() {
        let c = line(30, 0.0, 3.0);
        let x = c.map(|v| v.sin());
        let k = GaussianRbf::new(vec![0.5]).unwrap().matrix(&x, &x).unwrap();
        let l = GaussianRbf::new(vec![0.5]).unwrap().matrix(&c, &c).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let lam = select_lambda(&k, &l, 5, &mut rng).unwrap();
        let exponent = -lam.log2();
        assert_abs_diff_eq!(exponent, exponent.round(), epsilon = 1e-12);
        assert!((0.0..20.0).contains(&exponent));
    }

    #[test]
    fn test_redraw_labels_keeps_groups_populated() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let prop = vec![0.5; 10];
        for _ in 0..50 {
            let labels = redraw_labels(&prop, &mut rng).unwrap();
            let n_test = labels.iter().filter(|&&t| t).count();
            assert!(n_test >= 2 && n_test <= 8);
        }
        assert!(redraw_labels(&[0.0, 0.0, 0.0, 0.0], &mut rng).is_err());
    }

    #[test]
    fn test_invalid_smoother_clip() {
        assert!(KernelSmoother::new(0.0).is_err());
        assert!(KernelSmoother::new(0.5).is_err());
        assert!(KernelSmoother::new(0.01).is_ok());
    }
}
