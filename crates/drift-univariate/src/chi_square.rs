//! Chi-squared test of independence on ref/test category counts

use crate::config::ChiSquareConfig;
use crate::detector::UnivariateDrift;
use crate::traits::FeatureScorer;
use crate::types::{Categories, FeatureScores};
use drift_core::data::column_values;
use drift_core::{Error, Result, SharedPreprocessor};
use nalgebra::DMatrix;
use ordered_float::OrderedFloat;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::collections::BTreeMap;
use tracing::warn;

/// Outcome of a chi-squared contingency test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiSquareTest {
    pub statistic: f64,
    pub p_value: f64,
    pub dof: usize,
}

/// Chi-squared test of independence on a contingency table
///
/// All-zero rows and columns are dropped first. With one degree of freedom
/// Yates' continuity correction is applied.
pub fn chi2_contingency(table: &[Vec<f64>]) -> Result<ChiSquareTest> {
    let n_cols = table.first().map(|r| r.len()).unwrap_or(0);
    for row in table {
        if row.len() != n_cols {
            return Err(Error::size_mismatch(n_cols, row.len(), "contingency table row"));
        }
        if row.iter().any(|&v| !v.is_finite() || v < 0.0) {
            return Err(Error::InvalidInput(
                "contingency table must hold finite, non-negative counts".to_string(),
            ));
        }
    }

    let row_sums: Vec<f64> = table.iter().map(|r| r.iter().sum()).collect();
    let col_sums: Vec<f64> = (0..n_cols)
        .map(|j| table.iter().map(|r| r[j]).sum())
        .collect();
    let rows: Vec<usize> = (0..table.len()).filter(|&i| row_sums[i] > 0.0).collect();
    let cols: Vec<usize> = (0..n_cols).filter(|&j| col_sums[j] > 0.0).collect();

    if rows.len() < 2 || cols.len() < 2 {
        return Ok(ChiSquareTest {
            statistic: 0.0,
            p_value: 1.0,
            dof: 0,
        });
    }

    let total: f64 = row_sums.iter().sum();
    let dof = (rows.len() - 1) * (cols.len() - 1);

    let mut statistic = 0.0;
    for &i in &rows {
        for &j in &cols {
            let expected = row_sums[i] * col_sums[j] / total;
            let mut diff = (table[i][j] - expected).abs();
            if dof == 1 {
                diff -= diff.min(0.5);
            }
            statistic += diff * diff / expected;
        }
    }

    let dist = ChiSquared::new(dof as f64).map_err(|e| {
        Error::Computation(format!("Failed to create chi-squared distribution: {e}"))
    })?;
    let p_value = dist.sf(statistic).clamp(0.0, 1.0);

    Ok(ChiSquareTest {
        statistic,
        p_value,
        dof,
    })
}

/// Ordered category set of one feature
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryIndex {
    index: BTreeMap<OrderedFloat<f64>, usize>,
}

impl CategoryIndex {
    /// Resolve a category spec against the reference values of the feature
    pub fn resolve(spec: &Categories, reference: &[f64]) -> Result<Self> {
        let values: Vec<f64> = match spec {
            Categories::Infer => reference.to_vec(),
            Categories::Count(0) => {
                return Err(Error::InvalidParameter(
                    "category count must be positive".to_string(),
                ))
            }
            Categories::Count(n) => (0..*n).map(|c| c as f64).collect(),
            Categories::Values(v) if v.is_empty() => {
                return Err(Error::InvalidParameter(
                    "category list must not be empty".to_string(),
                ))
            }
            Categories::Values(v) => v.clone(),
        };
        if values.iter().any(|v| v.is_nan()) {
            return Err(Error::non_finite("category values"));
        }

        let mut keys: Vec<OrderedFloat<f64>> = values.into_iter().map(OrderedFloat).collect();
        keys.sort();
        keys.dedup();
        let index = keys.into_iter().enumerate().map(|(i, k)| (k, i)).collect();
        Ok(Self { index })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Category values in ascending order
    pub fn values(&self) -> Vec<f64> {
        self.index.keys().map(|k| k.0).collect()
    }

    /// Count occurrences per category; values outside the set are tallied separately
    pub fn counts(&self, values: &[f64]) -> (Vec<f64>, usize) {
        let mut counts = vec![0.0; self.index.len()];
        let mut unseen = 0;
        for &v in values {
            match self.index.get(&OrderedFloat(v)) {
                Some(&i) => counts[i] += 1.0,
                None => unseen += 1,
            }
        }
        (counts, unseen)
    }
}

/// Chi-squared test of one categorical feature
pub(crate) fn categorical_score(
    feature: usize,
    categories: &CategoryIndex,
    x_ref: &[f64],
    x: &[f64],
) -> Result<ChiSquareTest> {
    let (ref_counts, _) = categories.counts(x_ref);
    let (test_counts, unseen) = categories.counts(x);
    if unseen > 0 {
        warn!(
            "Feature {feature}: {unseen} test values outside the reference categories were ignored"
        );
    }
    chi2_contingency(&[ref_counts, test_counts])
}

/// Resolve the category set of every categorical feature
pub(crate) fn fit_categories(
    spec: &BTreeMap<usize, Categories>,
    features: impl Iterator<Item = usize>,
    x_ref: &DMatrix<f64>,
) -> Result<BTreeMap<usize, CategoryIndex>> {
    if let Some(&f) = spec.keys().find(|&&f| f >= x_ref.ncols()) {
        return Err(Error::InvalidParameter(format!(
            "categorical feature {f} out of range for {} features",
            x_ref.ncols()
        )));
    }
    features
        .map(|f| {
            let spec = spec.get(&f).cloned().unwrap_or_default();
            CategoryIndex::resolve(&spec, &column_values(x_ref, f)).map(|c| (f, c))
        })
        .collect()
}

/// Feature-wise chi-squared scorer; every feature is categorical
#[derive(Debug, Clone, Default)]
pub struct ChiSquareScorer {
    spec: BTreeMap<usize, Categories>,
    categories: BTreeMap<usize, CategoryIndex>,
}

impl ChiSquareScorer {
    /// Features missing from `spec` have their categories inferred
    pub fn new(spec: BTreeMap<usize, Categories>) -> Self {
        Self {
            spec,
            categories: BTreeMap::new(),
        }
    }

    /// Fitted category values per feature
    pub fn categories(&self) -> BTreeMap<usize, Vec<f64>> {
        self.categories
            .iter()
            .map(|(&f, c)| (f, c.values()))
            .collect()
    }
}

impl FeatureScorer for ChiSquareScorer {
    fn detector_name(&self) -> &'static str {
        "ChiSquareDrift"
    }

    fn fit(&mut self, x_ref: &DMatrix<f64>) -> Result<()> {
        self.categories = fit_categories(&self.spec, 0..x_ref.ncols(), x_ref)?;
        Ok(())
    }

    fn score(&self, x_ref: &DMatrix<f64>, x: &DMatrix<f64>) -> Result<FeatureScores> {
        let mut scores = FeatureScores::with_capacity(x_ref.ncols());
        for f in 0..x_ref.ncols() {
            let categories = self.categories.get(&f).ok_or_else(|| {
                Error::InvalidInput(format!("no categories fitted for feature {f}"))
            })?;
            let test = categorical_score(
                f,
                categories,
                &column_values(x_ref, f),
                &column_values(x, f),
            )?;
            scores.push(test.p_value, test.statistic);
        }
        Ok(scores)
    }
}

/// Feature-wise chi-squared drift detector for categorical data
pub type ChiSquareDrift = UnivariateDrift<ChiSquareScorer>;

impl UnivariateDrift<ChiSquareScorer> {
    /// Detector with default settings and categories inferred from `x_ref`
    pub fn new(x_ref: DMatrix<f64>) -> Result<Self> {
        Self::from_config(x_ref, ChiSquareConfig::default())
    }

    pub fn from_config(x_ref: DMatrix<f64>, config: ChiSquareConfig) -> Result<Self> {
        Self::with_preprocessor(x_ref, config, None)
    }

    pub fn with_preprocessor(
        x_ref: DMatrix<f64>,
        config: ChiSquareConfig,
        preprocessor: Option<SharedPreprocessor>,
    ) -> Result<Self> {
        UnivariateDrift::with_scorer(
            x_ref,
            ChiSquareScorer::new(config.categories_per_feature),
            config.base,
            preprocessor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_two_by_two_uses_yates() {
        let t = chi2_contingency(&[vec![10.0, 20.0], vec![20.0, 10.0]]).unwrap();
        assert_eq!(t.dof, 1);
        assert_abs_diff_eq!(t.statistic, 5.4, epsilon = 1e-10);
        assert_abs_diff_eq!(t.p_value, 0.02014, epsilon = 1e-4);
    }

    #[test]
    fn test_extreme_table_keeps_tail_precision() {
        let t = chi2_contingency(&[vec![100.0, 10.0], vec![10.0, 100.0]]).unwrap();
        assert!(t.statistic > 100.0);
        assert!(t.p_value > 0.0);
        assert!(t.p_value < 1e-20);
    }

    #[test]
    fn test_two_by_three_without_correction() {
        let t = chi2_contingency(&[vec![10.0, 20.0, 30.0], vec![30.0, 20.0, 10.0]]).unwrap();
        assert_eq!(t.dof, 2);
        assert_abs_diff_eq!(t.statistic, 20.0, epsilon = 1e-10);
        assert_abs_diff_eq!(t.p_value, (-10.0f64).exp(), epsilon = 1e-9);
    }

    #[test]
    fn test_zero_columns_dropped() {
        let with_zero =
            chi2_contingency(&[vec![10.0, 0.0, 20.0, 30.0], vec![30.0, 0.0, 20.0, 10.0]]).unwrap();
        let without = chi2_contingency(&[vec![10.0, 20.0, 30.0], vec![30.0, 20.0, 10.0]]).unwrap();
        assert_eq!(with_zero, without);
    }

    #[test]
    fn test_degenerate_table() {
        let t = chi2_contingency(&[vec![5.0, 5.0], vec![0.0, 0.0]]).unwrap();
        assert_eq!(t.dof, 0);
        assert_eq!(t.p_value, 1.0);
        assert!(chi2_contingency(&[vec![1.0, -1.0], vec![1.0, 1.0]]).is_err());
    }

    #[test]
    fn test_category_index() {
        let idx = CategoryIndex::resolve(&Categories::Infer, &[2.0, 0.0, 2.0, 1.0]).unwrap();
        assert_eq!(idx.values(), vec![0.0, 1.0, 2.0]);
        let (counts, unseen) = idx.counts(&[0.0, 2.0, 2.0, 7.0]);
        assert_eq!(counts, vec![1.0, 0.0, 2.0]);
        assert_eq!(unseen, 1);

        let idx = CategoryIndex::resolve(&Categories::Count(4), &[]).unwrap();
        assert_eq!(idx.len(), 4);
        assert!(CategoryIndex::resolve(&Categories::Count(0), &[]).is_err());
    }

    #[test]
    fn test_scorer_detects_shifted_frequencies() {
        let x_ref = DMatrix::from_fn(200, 1, |i, _| (i % 2) as f64);
        let x = DMatrix::from_fn(200, 1, |i, _| if i % 10 == 0 { 0.0 } else { 1.0 });
        let mut scorer = ChiSquareScorer::default();
        scorer.fit(&x_ref).unwrap();
        let scores = scorer.score(&x_ref, &x).unwrap();
        assert!(scores.p_vals[0] < 1e-6);
        assert_eq!(scorer.categories()[&0], vec![0.0, 1.0]);
    }

    #[test]
    fn test_out_of_range_spec_rejected() {
        let mut spec = BTreeMap::new();
        spec.insert(3, Categories::Count(2));
        let mut scorer = ChiSquareScorer::new(spec);
        assert!(scorer.fit(&DMatrix::zeros(10, 2)).is_err());
    }
}
