//! # Drift Uncertainty
//!
//! Drift detection on the uncertainty of a model's predictions.
//!
//! A model maps every instance to a scalar uncertainty and a univariate test
//! compares the reference and test uncertainty distributions:
//!
//! - [`ClassifierUncertaintyDrift`]: prediction entropy tested with KS, or
//!   margin membership tested with chi-squared
//! - [`RegressorUncertaintyDrift`]: spread of MC-dropout draws or ensemble
//!   members tested with KS
//!
//! ```rust
//! use drift_core::{DriftDetector, Result};
//! use drift_uncertainty::ClassifierUncertaintyDrift;
//! use nalgebra::DMatrix;
//!
//! // Binary classifier: confident far from zero, uncertain near it
//! let model = |x: &DMatrix<f64>| -> Result<DMatrix<f64>> {
//!     Ok(DMatrix::from_fn(x.nrows(), 1, |i, _| 1.0 / (1.0 + (-4.0 * x[(i, 0)]).exp())))
//! };
//!
//! let x_ref = DMatrix::from_fn(100, 1, |i, _| if i % 2 == 0 { 3.0 } else { -3.0 });
//! let mut cd = ClassifierUncertaintyDrift::new(x_ref, model).unwrap();
//!
//! let x = DMatrix::from_fn(100, 1, |i, _| (i as f64 - 50.0) / 500.0);
//! let pred = cd.predict(&x).unwrap();
//! assert!(pred.data.is_drift.any());
//! ```

pub mod detectors;
pub mod model;
pub mod uncertainty;

pub use detectors::{
    ClassifierUncertaintyConfig, ClassifierUncertaintyDrift, RegressorUncertaintyConfig,
    RegressorUncertaintyDrift,
};
pub use model::{
    Classifier, EnsembleRegressor, Regressor, RegressorEnsemble, RegressorModel,
    StochasticRegressor,
};
pub use uncertainty::{
    entropy, margin, population_std, softmax, to_probs, ClassifierUncertainty,
    ClassifierUncertaintyType, PredsType, RegressorUncertainty, RegressorUncertaintyType,
};
