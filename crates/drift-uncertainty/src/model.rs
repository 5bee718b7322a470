//! Model interfaces for uncertainty-based detection
//!
//! Models are plain Rust values behind these traits; closures with the
//! matching signature implement them directly.

use drift_core::{Error, Result};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use std::sync::Arc;

/// Class scores, one row per instance and one column per class
pub trait Classifier: Send + Sync {
    fn predict(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>>;
}

impl<F> Classifier for F
where
    F: Fn(&DMatrix<f64>) -> Result<DMatrix<f64>> + Send + Sync,
{
    fn predict(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self(x)
    }
}

/// Point predictions, one per instance
pub trait Regressor: Send + Sync {
    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>>;
}

impl<F> Regressor for F
where
    F: Fn(&DMatrix<f64>) -> Result<DVector<f64>> + Send + Sync,
{
    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>> {
        self(x)
    }
}

/// Regressor with stochastic forward passes (e.g. dropout left active)
pub trait StochasticRegressor: Send + Sync {
    /// One stochastic draw of the predictions
    fn predict_stochastic(&self, x: &DMatrix<f64>, rng: &mut StdRng) -> Result<DVector<f64>>;
}

impl<F> StochasticRegressor for F
where
    F: Fn(&DMatrix<f64>, &mut StdRng) -> Result<DVector<f64>> + Send + Sync,
{
    fn predict_stochastic(&self, x: &DMatrix<f64>, rng: &mut StdRng) -> Result<DVector<f64>> {
        self(x, rng)
    }
}

/// Ensemble whose members predict side by side
pub trait EnsembleRegressor: Send + Sync {
    /// One row per instance, one column per member
    fn predict_members(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>>;
}

impl<F> EnsembleRegressor for F
where
    F: Fn(&DMatrix<f64>) -> Result<DMatrix<f64>> + Send + Sync,
{
    fn predict_members(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self(x)
    }
}

/// Ensemble assembled from independent regressors
#[derive(Clone, Default)]
pub struct RegressorEnsemble {
    members: Vec<Arc<dyn Regressor>>,
}

impl RegressorEnsemble {
    pub fn new(members: Vec<Arc<dyn Regressor>>) -> Result<Self> {
        if members.is_empty() {
            return Err(Error::InvalidParameter(
                "ensemble needs at least one member".to_string(),
            ));
        }
        Ok(Self { members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl EnsembleRegressor for RegressorEnsemble {
    fn predict_members(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let mut out = DMatrix::zeros(x.nrows(), self.members.len());
        for (m, member) in self.members.iter().enumerate() {
            let preds = member.predict(x)?;
            if preds.len() != x.nrows() {
                return Err(Error::Model(format!(
                    "ensemble member {m} returned {} predictions for {} instances",
                    preds.len(),
                    x.nrows()
                )));
            }
            out.set_column(m, &preds);
        }
        Ok(out)
    }
}

/// Regression model together with how its uncertainty is sampled
#[derive(Clone)]
pub enum RegressorModel {
    /// Repeated stochastic forward passes
    Stochastic(Arc<dyn StochasticRegressor>),
    /// Spread across ensemble members
    Ensemble(Arc<dyn EnsembleRegressor>),
}

impl RegressorModel {
    pub fn stochastic(model: impl StochasticRegressor + 'static) -> Self {
        RegressorModel::Stochastic(Arc::new(model))
    }

    pub fn ensemble(model: impl EnsembleRegressor + 'static) -> Self {
        RegressorModel::Ensemble(Arc::new(model))
    }
}
