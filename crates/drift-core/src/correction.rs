//! Aggregation of per-feature p-values into a drift decision

use crate::types::DriftFlag;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Multivariate correction applied to per-feature p-values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correction {
    /// Family-wise error control: compare against `p_val / k`
    #[default]
    Bonferroni,
    /// Benjamini-Hochberg false discovery rate control
    Fdr,
}

/// Level at which drift is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftType {
    /// One decision for the whole batch, corrected across features
    #[default]
    Batch,
    /// One uncorrected decision per feature
    Feature,
}

/// Decision and the threshold it was taken at
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub is_drift: DriftFlag,
    pub threshold: f64,
}

/// Validate a significance level
pub fn check_p_value(p_val: f64) -> Result<()> {
    if !(p_val > 0.0 && p_val < 1.0) {
        return Err(Error::invalid_p_value(p_val));
    }
    Ok(())
}

/// Benjamini-Hochberg procedure
///
/// Returns whether any hypothesis is rejected at false discovery rate
/// `q_val`, and the rank threshold `q_val * i / k` of the largest rejected
/// rank. Without rejections the strictest threshold `q_val / k` is returned.
pub fn fdr(p_vals: &[f64], q_val: f64) -> (bool, f64) {
    let k = p_vals.len();
    if k == 0 {
        return (false, q_val);
    }
    let mut sorted = p_vals.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rejected = sorted
        .iter()
        .enumerate()
        .filter(|&(i, &p)| p < q_val * (i + 1) as f64 / k as f64)
        .map(|(i, _)| i)
        .last();

    match rejected {
        Some(i) => (true, q_val * (i + 1) as f64 / k as f64),
        None => (false, q_val / k as f64),
    }
}

/// Turn per-feature p-values into a drift decision
pub fn decide(
    p_vals: &[f64],
    p_val: f64,
    correction: Correction,
    drift_type: DriftType,
) -> Decision {
    match drift_type {
        DriftType::Feature => Decision {
            is_drift: DriftFlag::Feature(p_vals.iter().map(|&p| p < p_val).collect()),
            threshold: p_val,
        },
        DriftType::Batch => {
            let k = p_vals.len().max(1);
            match correction {
                Correction::Bonferroni => {
                    let threshold = p_val / k as f64;
                    Decision {
                        is_drift: DriftFlag::Batch(p_vals.iter().any(|&p| p < threshold)),
                        threshold,
                    }
                }
                Correction::Fdr => {
                    let (is_drift, threshold) = fdr(p_vals, p_val);
                    Decision {
                        is_drift: DriftFlag::Batch(is_drift),
                        threshold,
                    }
                }
            }
        }
    }
}
