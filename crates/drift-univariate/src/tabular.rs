//! Mixed-type tabular drift: chi-squared on categorical features, KS elsewhere

use crate::chi_square::{categorical_score, fit_categories, CategoryIndex};
use crate::config::TabularConfig;
use crate::detector::UnivariateDrift;
use crate::ks::ks_2samp;
use crate::traits::FeatureScorer;
use crate::types::{Alternative, Categories, FeatureScores};
use drift_core::data::column_values;
use drift_core::{Result, SharedPreprocessor};
use nalgebra::DMatrix;
use std::collections::BTreeMap;

/// Feature-wise scorer dispatching on the declared feature type
#[derive(Debug, Clone, Default)]
pub struct TabularScorer {
    spec: BTreeMap<usize, Categories>,
    categories: BTreeMap<usize, CategoryIndex>,
    alternative: Alternative,
}

impl TabularScorer {
    /// Features listed in `spec` are categorical, all others continuous
    pub fn new(spec: BTreeMap<usize, Categories>, alternative: Alternative) -> Self {
        Self {
            spec,
            categories: BTreeMap::new(),
            alternative,
        }
    }

    pub fn is_categorical(&self, feature: usize) -> bool {
        self.spec.contains_key(&feature)
    }

    /// Fitted category values of the categorical features
    pub fn categories(&self) -> BTreeMap<usize, Vec<f64>> {
        self.categories
            .iter()
            .map(|(&f, c)| (f, c.values()))
            .collect()
    }
}

impl FeatureScorer for TabularScorer {
    fn detector_name(&self) -> &'static str {
        "TabularDrift"
    }

    fn fit(&mut self, x_ref: &DMatrix<f64>) -> Result<()> {
        let features: Vec<usize> = self.spec.keys().copied().collect();
        self.categories = fit_categories(&self.spec, features.into_iter(), x_ref)?;
        Ok(())
    }

    fn score(&self, x_ref: &DMatrix<f64>, x: &DMatrix<f64>) -> Result<FeatureScores> {
        let mut scores = FeatureScores::with_capacity(x_ref.ncols());
        for f in 0..x_ref.ncols() {
            let (r, t) = (column_values(x_ref, f), column_values(x, f));
            match self.categories.get(&f) {
                Some(categories) => {
                    let test = categorical_score(f, categories, &r, &t)?;
                    scores.push(test.p_value, test.statistic);
                }
                None => {
                    let (dist, p) = ks_2samp(&r, &t, self.alternative)?;
                    scores.push(p, dist);
                }
            }
        }
        Ok(scores)
    }
}

/// Drift detector for tables mixing categorical and continuous features
pub type TabularDrift = UnivariateDrift<TabularScorer>;

impl UnivariateDrift<TabularScorer> {
    /// Detector treating every feature as continuous
    pub fn new(x_ref: DMatrix<f64>) -> Result<Self> {
        Self::from_config(x_ref, TabularConfig::default())
    }

    pub fn from_config(x_ref: DMatrix<f64>, config: TabularConfig) -> Result<Self> {
        Self::with_preprocessor(x_ref, config, None)
    }

    pub fn with_preprocessor(
        x_ref: DMatrix<f64>,
        config: TabularConfig,
        preprocessor: Option<SharedPreprocessor>,
    ) -> Result<Self> {
        UnivariateDrift::with_scorer(
            x_ref,
            TabularScorer::new(config.categories_per_feature, config.alternative),
            config.base,
            preprocessor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chi_square::chi2_contingency;
    use approx::assert_abs_diff_eq;

    fn mixed_reference() -> DMatrix<f64> {
        DMatrix::from_fn(120, 2, |i, j| match j {
            0 => (i % 3) as f64,
            _ => (i as f64) / 10.0,
        })
    }

    #[test]
    fn test_dispatch_per_feature_type() {
        let mut spec = BTreeMap::new();
        spec.insert(0, Categories::Infer);
        let mut scorer = TabularScorer::new(spec, Alternative::TwoSided);
        let x_ref = mixed_reference();
        scorer.fit(&x_ref).unwrap();
        assert!(scorer.is_categorical(0));
        assert!(!scorer.is_categorical(1));
        assert_eq!(scorer.categories().len(), 1);

        let x = DMatrix::from_fn(60, 2, |i, j| match j {
            0 => 0.0,
            _ => (i as f64) / 5.0,
        });
        let scores = scorer.score(&x_ref, &x).unwrap();

        let ks = ks_2samp(
            &column_values(&x_ref, 1),
            &column_values(&x, 1),
            Alternative::TwoSided,
        )
        .unwrap();
        assert_abs_diff_eq!(scores.distances[1], ks.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scores.p_vals[1], ks.1, epsilon = 1e-12);

        let chi = chi2_contingency(&[vec![40.0, 40.0, 40.0], vec![60.0, 0.0, 0.0]]).unwrap();
        assert_abs_diff_eq!(scores.distances[0], chi.statistic, epsilon = 1e-10);
        assert!(scores.p_vals[0] < 1e-10);
    }

    #[test]
    fn test_without_categories_every_feature_is_continuous() {
        let mut scorer = TabularScorer::default();
        let x_ref = mixed_reference();
        scorer.fit(&x_ref).unwrap();
        assert!(scorer.categories().is_empty());
        let scores = scorer.score(&x_ref, &x_ref).unwrap();
        assert_eq!(scores.distances, vec![0.0, 0.0]);
    }
}
