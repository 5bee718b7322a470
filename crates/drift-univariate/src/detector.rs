//! Generic feature-wise drift detector
//!
//! `UnivariateDrift` owns the reference set and everything around the test
//! itself (preprocessing, correction, reference updates, result assembly).
//! The per-feature test is supplied by a [`FeatureScorer`].

use crate::config::UnivariateConfig;
use crate::traits::FeatureScorer;
use crate::types::{FeatureScores, UnivariateDriftData};
use drift_core::data::{ensure_finite, ensure_rows};
use drift_core::{
    decide, rng_from_seed, DetectorProperties, DriftDetector, DriftPrediction, Error, Meta,
    Reference, Result, SharedPreprocessor,
};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use tracing::{debug, instrument};

/// Feature-wise drift detector parameterized by its two-sample test
pub struct UnivariateDrift<S> {
    scorer: S,
    reference: Reference,
    config: UnivariateConfig,
    n_features: usize,
    meta: Meta,
    rng: StdRng,
}

impl<S: FeatureScorer> UnivariateDrift<S> {
    /// Build a detector around `scorer`
    ///
    /// The scorer is fitted on the reference set in model space.
    pub fn with_scorer(
        x_ref: DMatrix<f64>,
        mut scorer: S,
        config: UnivariateConfig,
        preprocessor: Option<SharedPreprocessor>,
    ) -> Result<Self> {
        config.validate()?;
        ensure_rows(&x_ref, 1)?;

        let reference = Reference::new(
            x_ref,
            preprocessor,
            config.preprocess_at_init,
            config.update_x_ref,
        )?;
        let n_features = {
            let x_ref = reference.model_space()?;
            ensure_finite(&x_ref, "reference data")?;
            scorer.fit(&x_ref)?;
            x_ref.ncols()
        };
        if n_features == 0 {
            return Err(Error::InvalidInput("reference set has no features".to_string()));
        }

        let meta = Meta::new(scorer.detector_name(), config.data_type.clone());
        debug!(
            "{} over {} reference instances and {n_features} features",
            meta.name,
            reference.len()
        );
        Ok(Self {
            rng: rng_from_seed(config.seed),
            scorer,
            reference,
            config,
            n_features,
            meta,
        })
    }

    pub fn config(&self) -> &UnivariateConfig {
        &self.config
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    /// Number of features tested, in model space
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Stored reference set (transformed when preprocessed at init)
    pub fn x_ref(&self) -> &DMatrix<f64> {
        self.reference.data()
    }

    /// Feature-wise p-values and statistics for `x`, without a decision
    #[instrument(skip(self, x), fields(detector = self.meta.name.as_str(), n = x.nrows()))]
    pub fn score(&self, x: &DMatrix<f64>) -> Result<FeatureScores> {
        let (x_ref, x) = self.reference.prepare(x)?;
        self.score_prepared(&x_ref, &x)
    }

    fn score_prepared(&self, x_ref: &DMatrix<f64>, x: &DMatrix<f64>) -> Result<FeatureScores> {
        ensure_rows(x, 1)?;
        if x.ncols() != self.n_features {
            return Err(Error::size_mismatch(self.n_features, x.ncols(), "test batch features"));
        }
        ensure_finite(x, "test batch")?;
        self.scorer.score(x_ref, x)
    }
}

impl<S: FeatureScorer> DetectorProperties for UnivariateDrift<S> {
    fn name(&self) -> &'static str {
        self.scorer.detector_name()
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn reference_size(&self) -> usize {
        self.reference.len()
    }
}

impl<S: FeatureScorer> DriftDetector for UnivariateDrift<S> {
    type Data = UnivariateDriftData;

    #[instrument(skip(self, x), fields(detector = self.meta.name.as_str(), n = x.nrows()))]
    fn predict(&mut self, x: &DMatrix<f64>) -> Result<DriftPrediction<UnivariateDriftData>> {
        let (scores, processed) = {
            let (x_ref, processed) = self.reference.prepare(x)?;
            let scores = self.score_prepared(&x_ref, &processed)?;
            (scores, processed.into_owned())
        };

        let decision = decide(
            &scores.p_vals,
            self.config.p_val,
            self.config.correction,
            self.config.drift_type,
        );
        debug!(
            "p-values {:?} against threshold {:.6}: {}",
            scores.p_vals, decision.threshold, decision.is_drift
        );

        self.reference.update(x, &processed, &mut self.rng)?;

        let data = UnivariateDriftData {
            is_drift: decision.is_drift,
            threshold: decision.threshold,
            p_val: self.config.return_p_val.then_some(scores.p_vals),
            distance: self.config.return_distance.then_some(scores.distances),
        };
        Ok(DriftPrediction::new(self.meta.clone(), data))
    }
}
