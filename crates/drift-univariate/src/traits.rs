//! Scorer trait behind every univariate detector

use crate::types::FeatureScores;
use drift_core::Result;
use nalgebra::DMatrix;

/// Feature-wise two-sample test
///
/// Scorers see reference and test data already in model space and return
/// one p-value and one statistic per column.
pub trait FeatureScorer: Send + Sync {
    /// Name reported in prediction metadata
    fn detector_name(&self) -> &'static str;

    /// Learn anything that depends on the reference set (e.g. category sets)
    fn fit(&mut self, _x_ref: &DMatrix<f64>) -> Result<()> {
        Ok(())
    }

    /// Test every feature of `x` against `x_ref`
    fn score(&self, x_ref: &DMatrix<f64>, x: &DMatrix<f64>) -> Result<FeatureScores>;
}
