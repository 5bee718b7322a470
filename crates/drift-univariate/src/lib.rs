//! Feature-wise univariate drift detectors
//!
//! Every detector here runs one two-sample test per feature and aggregates
//! the p-values with a multivariate correction:
//!
//! - [`KsDrift`]: Kolmogorov-Smirnov, for continuous features
//! - [`ChiSquareDrift`]: chi-squared on category counts, for categorical features
//! - [`TabularDrift`]: chi-squared on declared categorical features, KS on the rest
//!
//! # Example
//!
//! ```rust
//! use drift_core::DriftDetector;
//! use drift_univariate::{KsConfig, KsDrift};
//! use nalgebra::DMatrix;
//!
//! let x_ref = DMatrix::from_fn(200, 2, |i, j| ((i * 7 + j * 13) % 100) as f64 / 100.0);
//! let mut cd = KsDrift::from_config(x_ref.clone(), KsConfig::default().with_p_val(0.05)).unwrap();
//!
//! let pred = cd.predict(&x_ref).unwrap();
//! assert!(!pred.data.is_drift.any());
//!
//! let shifted = x_ref.map(|v| v + 0.5);
//! assert!(cd.predict(&shifted).unwrap().data.is_drift.any());
//! ```

pub mod chi_square;
pub mod config;
pub mod detector;
pub mod ks;
pub mod tabular;
pub mod traits;
pub mod types;

pub use chi_square::{
    chi2_contingency, CategoryIndex, ChiSquareDrift, ChiSquareScorer, ChiSquareTest,
};
pub use config::{ChiSquareConfig, KsConfig, TabularConfig, UnivariateConfig};
pub use detector::UnivariateDrift;
pub use ks::{kolmogorov_sf, ks_2samp, KsDrift, KsScorer};
pub use tabular::{TabularDrift, TabularScorer};
pub use traits::FeatureScorer;
pub use types::{Alternative, Categories, FeatureScores, UnivariateDriftData};
