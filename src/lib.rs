//! # Drift Detect
//!
//! Distribution drift detection for batches of numeric data.
//!
//! The workspace is split by test family:
//!
//! - [`drift_core`]: shared types, multiple-testing corrections, reference updates,
//!   permutation machinery and execution engines
//! - [`drift_univariate`]: feature-wise Kolmogorov-Smirnov, chi-squared and mixed
//!   tabular detectors
//! - [`drift_kernel`]: MMD and context-aware MMD permutation tests
//! - [`drift_uncertainty`]: tests on the uncertainty of classifier and regressor
//!   predictions
//!
//! Every detector holds a reference set, implements
//! [`DriftDetector`](drift_core::DriftDetector) and returns a
//! [`DriftPrediction`](drift_core::DriftPrediction) carrying the detector
//! metadata and a test-specific data section.
//!
//! ```rust
//! use drift_detect::prelude::*;
//! use nalgebra::DMatrix;
//!
//! let x_ref = DMatrix::from_fn(50, 2, |i, j| ((i * 7 + j * 3) % 11) as f64);
//! let mut cd = KsDrift::new(x_ref).unwrap();
//!
//! let x = DMatrix::from_fn(50, 2, |i, j| ((i * 7 + j * 3) % 11) as f64 + 20.0);
//! let pred = cd.predict(&x).unwrap();
//! assert!(pred.data.is_drift.any());
//! ```

pub use drift_core;
pub use drift_kernel;
pub use drift_uncertainty;
pub use drift_univariate;

pub use drift_core::{Error, Result};

/// Detectors, configs and the traits needed to drive them
pub mod prelude {
    pub use drift_core::{
        Correction, DetectorProperties, DriftDetector, DriftFlag, DriftPrediction, DriftType,
        Error, Meta, Preprocessor, ReferenceUpdate, Result, SharedPreprocessor,
    };
    pub use drift_kernel::{
        ContextMmdConfig, ContextMmdDrift, GaussianRbf, Kernel, MmdConfig, MmdDrift,
    };
    pub use drift_uncertainty::{
        ClassifierUncertaintyConfig, ClassifierUncertaintyDrift, ClassifierUncertaintyType,
        PredsType, RegressorModel, RegressorUncertaintyConfig, RegressorUncertaintyDrift,
        RegressorUncertaintyType,
    };
    pub use drift_univariate::{
        Alternative, Categories, ChiSquareConfig, ChiSquareDrift, KsConfig, KsDrift,
        TabularConfig, TabularDrift,
    };
}
