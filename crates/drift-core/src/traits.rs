//! Core traits for drift detection
//!
//! Detectors are split the same way across crates:
//! - properties that do not depend on the test batch (`DetectorProperties`)
//! - the batch-level prediction (`DriftDetector`)
//! - an optional transform applied to both reference and test data (`Preprocessor`)

use crate::types::{DriftPrediction, Meta};
use crate::Result;
use nalgebra::DMatrix;
use std::sync::Arc;

/// Properties of a drift detector that don't depend on the test batch
pub trait DetectorProperties {
    /// Name of the detector
    fn name(&self) -> &'static str;

    /// Metadata attached to every prediction
    fn meta(&self) -> &Meta;

    /// Number of instances currently held in the reference set
    fn reference_size(&self) -> usize;
}

/// Batch drift detection against a stored reference set
pub trait DriftDetector: DetectorProperties {
    /// Detector-specific result payload
    type Data;

    /// Test `x` for drift against the reference set
    ///
    /// Detectors configured with a reference update policy fold `x` into the
    /// reference set after the test, hence `&mut self`.
    fn predict(&mut self, x: &DMatrix<f64>) -> Result<DriftPrediction<Self::Data>>;

    /// Test several batches in sequence
    fn predict_batches(
        &mut self,
        batches: &[DMatrix<f64>],
    ) -> Result<Vec<DriftPrediction<Self::Data>>> {
        batches.iter().map(|x| self.predict(x)).collect()
    }
}

/// Transform applied to reference and test data before testing
pub trait Preprocessor: Send + Sync {
    fn transform(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>>;
}

impl<F> Preprocessor for F
where
    F: Fn(&DMatrix<f64>) -> Result<DMatrix<f64>> + Send + Sync,
{
    fn transform(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self(x)
    }
}

/// Shared handle to a preprocessor
pub type SharedPreprocessor = Arc<dyn Preprocessor>;
