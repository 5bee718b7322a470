//! Types used by the univariate detectors

use drift_core::DriftFlag;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Alternative hypothesis for the Kolmogorov-Smirnov test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alternative {
    /// The two distributions differ
    #[default]
    TwoSided,
    /// The CDF of the reference lies below that of the test sample
    Less,
    /// The CDF of the reference lies above that of the test sample,
    /// i.e. test values are shifted right
    Greater,
}

/// Category set of a categorical feature
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Categories {
    /// Unique values observed in the reference set
    #[default]
    Infer,
    /// Categories `0..n`
    Count(usize),
    /// Explicit category values
    Values(Vec<f64>),
}

/// Per-feature test outcome, before any decision is taken
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureScores {
    /// One p-value per feature
    pub p_vals: Vec<f64>,
    /// One test statistic per feature
    pub distances: Vec<f64>,
}

impl FeatureScores {
    pub fn with_capacity(n_features: usize) -> Self {
        Self {
            p_vals: Vec::with_capacity(n_features),
            distances: Vec::with_capacity(n_features),
        }
    }

    pub fn push(&mut self, p_val: f64, distance: f64) {
        self.p_vals.push(p_val);
        self.distances.push(distance);
    }

    pub fn len(&self) -> usize {
        self.p_vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.p_vals.is_empty()
    }
}

/// Data section of a univariate drift prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnivariateDriftData {
    /// Batch-level or per-feature drift flag
    pub is_drift: DriftFlag,
    /// Threshold the p-values were compared against
    pub threshold: f64,
    /// Feature-wise p-values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_val: Option<Vec<f64>>,
    /// Feature-wise test statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<Vec<f64>>,
}

impl fmt::Display for UnivariateDriftData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Drift: {}", self.is_drift)?;
        writeln!(f, "  Threshold: {:.6}", self.threshold)?;
        if let Some(p_val) = &self.p_val {
            writeln!(f, "  p-values: {:?}", p_val)?;
        }
        if let Some(distance) = &self.distance {
            writeln!(f, "  Distances: {:?}", distance)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_are_skipped() {
        let data = UnivariateDriftData {
            is_drift: DriftFlag::Batch(true),
            threshold: 0.05,
            p_val: None,
            distance: Some(vec![0.4]),
        };
        let json = serde_json::to_string(&data).unwrap();
        assert!(!json.contains("p_val"));
        assert!(json.contains("\"distance\":[0.4]"));
    }

    #[test]
    fn test_categories_serde_names() {
        let json = serde_json::to_string(&Categories::Count(3)).unwrap();
        assert_eq!(json, "{\"count\":3}");
        let back: Categories = serde_json::from_str("\"infer\"").unwrap();
        assert_eq!(back, Categories::Infer);
    }
}
