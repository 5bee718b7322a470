//! Drift detectors on model uncertainty
//!
//! Both detectors map every instance to a scalar uncertainty with the model
//! and test the uncertainty distribution with a univariate detector. The
//! reference uncertainties are computed once at construction.

use crate::model::{Classifier, RegressorModel};
use crate::uncertainty::{
    ClassifierUncertainty, ClassifierUncertaintyType, PredsType, RegressorUncertainty,
    RegressorUncertaintyType,
};
use drift_core::{
    check_p_value, rng_from_seed, DetectorProperties, DriftDetector, DriftPrediction, Error, Meta,
    ReferenceUpdate, Result, SharedPreprocessor,
};
use drift_univariate::{
    Categories, ChiSquareConfig, ChiSquareDrift, KsConfig, KsDrift, UnivariateDriftData,
};
use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Config of [`ClassifierUncertaintyDrift`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierUncertaintyConfig {
    pub p_val: f64,
    pub preds_type: PredsType,
    pub uncertainty_type: ClassifierUncertaintyType,
    /// Probability gap below which an instance counts as uncertain (margin only)
    pub margin_width: f64,
    /// Rows per model call
    pub batch_size: usize,
    pub update_x_ref: ReferenceUpdate,
    pub data_type: Option<String>,
    pub seed: Option<u64>,
}

impl Default for ClassifierUncertaintyConfig {
    fn default() -> Self {
        Self {
            p_val: 0.05,
            preds_type: PredsType::Probs,
            uncertainty_type: ClassifierUncertaintyType::Entropy,
            margin_width: 0.1,
            batch_size: 32,
            update_x_ref: ReferenceUpdate::Fixed,
            data_type: None,
            seed: None,
        }
    }
}

impl ClassifierUncertaintyConfig {
    pub fn validate(&self) -> Result<()> {
        check_p_value(self.p_val)?;
        if !(self.margin_width > 0.0 && self.margin_width < 1.0) {
            return Err(Error::InvalidParameter(format!(
                "margin_width must be in (0, 1), got {}",
                self.margin_width
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidParameter("batch_size must be positive".to_string()));
        }
        self.update_x_ref.validate()
    }

    pub fn with_p_val(mut self, p_val: f64) -> Self {
        self.p_val = p_val;
        self
    }

    pub fn with_preds_type(mut self, preds_type: PredsType) -> Self {
        self.preds_type = preds_type;
        self
    }

    pub fn with_uncertainty_type(mut self, uncertainty_type: ClassifierUncertaintyType) -> Self {
        self.uncertainty_type = uncertainty_type;
        self
    }

    pub fn with_margin_width(mut self, margin_width: f64) -> Self {
        self.margin_width = margin_width;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_update_x_ref(mut self, update_x_ref: ReferenceUpdate) -> Self {
        self.update_x_ref = update_x_ref;
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Config of [`RegressorUncertaintyDrift`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressorUncertaintyConfig {
    pub p_val: f64,
    pub uncertainty_type: RegressorUncertaintyType,
    pub batch_size: usize,
    pub update_x_ref: ReferenceUpdate,
    pub data_type: Option<String>,
    /// Seed for stochastic forward passes and reservoir sampling
    pub seed: Option<u64>,
}

impl Default for RegressorUncertaintyConfig {
    fn default() -> Self {
        Self {
            p_val: 0.05,
            uncertainty_type: RegressorUncertaintyType::default(),
            batch_size: 32,
            update_x_ref: ReferenceUpdate::Fixed,
            data_type: None,
            seed: None,
        }
    }
}

impl RegressorUncertaintyConfig {
    pub fn validate(&self) -> Result<()> {
        check_p_value(self.p_val)?;
        if self.batch_size == 0 {
            return Err(Error::InvalidParameter("batch_size must be positive".to_string()));
        }
        self.update_x_ref.validate()
    }

    pub fn with_p_val(mut self, p_val: f64) -> Self {
        self.p_val = p_val;
        self
    }

    pub fn with_uncertainty_type(mut self, uncertainty_type: RegressorUncertaintyType) -> Self {
        self.uncertainty_type = uncertainty_type;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_update_x_ref(mut self, update_x_ref: ReferenceUpdate) -> Self {
        self.update_x_ref = update_x_ref;
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Univariate test run on the uncertainty scores
enum UncertaintyTest {
    Ks(KsDrift),
    ChiSquare(ChiSquareDrift),
}

impl UncertaintyTest {
    fn predict(&mut self, x: &DMatrix<f64>) -> Result<DriftPrediction<UnivariateDriftData>> {
        match self {
            UncertaintyTest::Ks(cd) => cd.predict(x),
            UncertaintyTest::ChiSquare(cd) => cd.predict(x),
        }
    }

    fn reference_size(&self) -> usize {
        match self {
            UncertaintyTest::Ks(cd) => cd.reference_size(),
            UncertaintyTest::ChiSquare(cd) => cd.reference_size(),
        }
    }

    fn x_ref(&self) -> &DMatrix<f64> {
        match self {
            UncertaintyTest::Ks(cd) => cd.x_ref(),
            UncertaintyTest::ChiSquare(cd) => cd.x_ref(),
        }
    }
}

fn ks_test(
    x_ref: DMatrix<f64>,
    preprocessor: SharedPreprocessor,
    p_val: f64,
    update_x_ref: ReferenceUpdate,
    seed: Option<u64>,
) -> Result<KsDrift> {
    let mut config = KsConfig::default()
        .with_p_val(p_val)
        .with_preprocess_at_init(true)
        .with_update_x_ref(update_x_ref);
    config.base.seed = seed;
    KsDrift::with_preprocessor(x_ref, config, Some(preprocessor))
}

/// Drift in the uncertainty of a classifier's predictions
pub struct ClassifierUncertaintyDrift {
    test: UncertaintyTest,
    config: ClassifierUncertaintyConfig,
    meta: Meta,
}

impl ClassifierUncertaintyDrift {
    pub fn new<M: Classifier + 'static>(x_ref: DMatrix<f64>, model: M) -> Result<Self> {
        Self::from_config(x_ref, model, ClassifierUncertaintyConfig::default())
    }

    pub fn from_config<M: Classifier + 'static>(
        x_ref: DMatrix<f64>,
        model: M,
        config: ClassifierUncertaintyConfig,
    ) -> Result<Self> {
        config.validate()?;
        let preprocessor: SharedPreprocessor = Arc::new(ClassifierUncertainty::new(
            model,
            config.preds_type,
            config.uncertainty_type,
            config.margin_width,
            config.batch_size,
        ));

        let test = match config.uncertainty_type {
            ClassifierUncertaintyType::Entropy => UncertaintyTest::Ks(ks_test(
                x_ref,
                preprocessor,
                config.p_val,
                config.update_x_ref,
                config.seed,
            )?),
            ClassifierUncertaintyType::Margin => {
                let mut chi2 = ChiSquareConfig::default()
                    .with_p_val(config.p_val)
                    .with_preprocess_at_init(true)
                    .with_update_x_ref(config.update_x_ref)
                    .with_categories(0, Categories::Values(vec![0.0, 1.0]));
                chi2.base.seed = config.seed;
                UncertaintyTest::ChiSquare(ChiSquareDrift::with_preprocessor(
                    x_ref,
                    chi2,
                    Some(preprocessor),
                )?)
            }
        };

        let meta = Meta::new("ClassifierUncertaintyDrift", config.data_type.clone());
        debug!(
            "ClassifierUncertaintyDrift ({:?}) over {} reference instances",
            config.uncertainty_type,
            test.reference_size()
        );
        Ok(Self { test, config, meta })
    }

    pub fn config(&self) -> &ClassifierUncertaintyConfig {
        &self.config
    }

    /// Reference uncertainty scores, one row per instance
    pub fn reference_uncertainty(&self) -> &DMatrix<f64> {
        self.test.x_ref()
    }
}

impl DetectorProperties for ClassifierUncertaintyDrift {
    fn name(&self) -> &'static str {
        "ClassifierUncertaintyDrift"
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn reference_size(&self) -> usize {
        self.test.reference_size()
    }
}

impl DriftDetector for ClassifierUncertaintyDrift {
    type Data = UnivariateDriftData;

    #[instrument(skip(self, x), fields(n = x.nrows()))]
    fn predict(&mut self, x: &DMatrix<f64>) -> Result<DriftPrediction<UnivariateDriftData>> {
        let pred = self.test.predict(x)?;
        Ok(DriftPrediction::new(self.meta.clone(), pred.data))
    }
}

/// Drift in the predictive spread of a regressor
pub struct RegressorUncertaintyDrift {
    test: KsDrift,
    config: RegressorUncertaintyConfig,
    meta: Meta,
}

impl RegressorUncertaintyDrift {
    pub fn new(x_ref: DMatrix<f64>, model: RegressorModel) -> Result<Self> {
        let config = match model {
            RegressorModel::Stochastic(_) => RegressorUncertaintyConfig::default(),
            RegressorModel::Ensemble(_) => RegressorUncertaintyConfig::default()
                .with_uncertainty_type(RegressorUncertaintyType::Ensemble),
        };
        Self::from_config(x_ref, model, config)
    }

    pub fn from_config(
        x_ref: DMatrix<f64>,
        model: RegressorModel,
        config: RegressorUncertaintyConfig,
    ) -> Result<Self> {
        config.validate()?;
        let n_evals = match (&model, config.uncertainty_type) {
            (RegressorModel::Stochastic(_), RegressorUncertaintyType::McDropout { n_evals }) => {
                n_evals
            }
            (RegressorModel::Ensemble(_), RegressorUncertaintyType::Ensemble) => 1,
            (_, uncertainty_type) => {
                return Err(Error::InvalidParameter(format!(
                    "{uncertainty_type:?} uncertainty does not match the supplied model"
                )))
            }
        };

        // Separate streams for forward passes and reference sampling
        let mut seeds = rng_from_seed(config.seed);
        let model_seed: u64 = seeds.gen();
        let preprocessor: SharedPreprocessor = Arc::new(RegressorUncertainty::new(
            model,
            n_evals,
            config.batch_size,
            model_seed,
        )?);
        let test = ks_test(
            x_ref,
            preprocessor,
            config.p_val,
            config.update_x_ref,
            Some(seeds.gen()),
        )?;

        let meta = Meta::new("RegressorUncertaintyDrift", config.data_type.clone());
        debug!(
            "RegressorUncertaintyDrift ({:?}) over {} reference instances",
            config.uncertainty_type,
            test.reference_size()
        );
        Ok(Self { test, config, meta })
    }

    pub fn config(&self) -> &RegressorUncertaintyConfig {
        &self.config
    }

    /// Reference uncertainty scores, one row per instance
    pub fn reference_uncertainty(&self) -> &DMatrix<f64> {
        self.test.x_ref()
    }
}

impl DetectorProperties for RegressorUncertaintyDrift {
    fn name(&self) -> &'static str {
        "RegressorUncertaintyDrift"
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn reference_size(&self) -> usize {
        self.test.reference_size()
    }
}

impl DriftDetector for RegressorUncertaintyDrift {
    type Data = UnivariateDriftData;

    #[instrument(skip(self, x), fields(n = x.nrows()))]
    fn predict(&mut self, x: &DMatrix<f64>) -> Result<DriftPrediction<UnivariateDriftData>> {
        let pred = self.test.predict(x)?;
        Ok(DriftPrediction::new(self.meta.clone(), pred.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_validation() {
        let config = ClassifierUncertaintyConfig::default();
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.margin_width, 0.1);
        assert_eq!(config.uncertainty_type, ClassifierUncertaintyType::Entropy);
        assert!(config.validate().is_ok());
        assert!(config.clone().with_margin_width(0.0).validate().is_err());
        assert!(config.with_batch_size(0).validate().is_err());

        let config = RegressorUncertaintyConfig::default();
        assert_eq!(
            config.uncertainty_type,
            RegressorUncertaintyType::McDropout { n_evals: 25 }
        );
        assert!(config.with_p_val(2.0).validate().is_err());
    }

    #[test]
    fn test_config_json() {
        let config = RegressorUncertaintyConfig::default()
            .with_uncertainty_type(RegressorUncertaintyType::McDropout { n_evals: 10 });
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("{\"mc_dropout\":{\"n_evals\":10}}"));
        let back: RegressorUncertaintyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
