//! Turning model outputs into per-instance uncertainty scores

use crate::model::{Classifier, RegressorModel};
use drift_core::data::{select_rows, vstack};
use drift_core::{Error, Preprocessor, Result};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::debug;

/// Mean absolute deviation of row sums from 1 tolerated for probabilities
const PROB_TOLERANCE: f64 = 1e-6;

/// What the classifier outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredsType {
    #[default]
    Probs,
    Logits,
}

/// Classifier uncertainty measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierUncertaintyType {
    /// Shannon entropy of the predicted distribution, tested with KS
    #[default]
    Entropy,
    /// Whether the top two classes are within the margin width, tested with chi-squared
    Margin,
}

/// Regressor uncertainty measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressorUncertaintyType {
    /// Spread of `n_evals` stochastic forward passes
    McDropout { n_evals: usize },
    /// Spread across ensemble members
    Ensemble,
}

impl Default for RegressorUncertaintyType {
    fn default() -> Self {
        RegressorUncertaintyType::McDropout { n_evals: 25 }
    }
}

/// Row-wise softmax, shifted by the row maximum
pub fn softmax(logits: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = logits.clone();
    for mut row in out.row_iter_mut() {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        for v in row.iter_mut() {
            *v = (*v - max).exp();
        }
        let sum = row.sum();
        row /= sum;
    }
    out
}

/// Class probabilities from raw classifier output
///
/// A single column is read as the probability (or logit) of one class of a
/// binary problem and expanded to `[p, 1 - p]`.
pub fn to_probs(preds: &DMatrix<f64>, preds_type: PredsType) -> Result<DMatrix<f64>> {
    if preds.ncols() == 0 {
        return Err(Error::Model("classifier returned no classes".to_string()));
    }
    if preds.iter().any(|v| !v.is_finite()) {
        return Err(Error::Model("classifier returned non-finite scores".to_string()));
    }
    let probs = match (preds_type, preds.ncols()) {
        (PredsType::Logits, 1) => {
            DMatrix::from_fn(preds.nrows(), 2, |i, j| {
                let p = 1.0 / (1.0 + (-preds[(i, 0)]).exp());
                if j == 0 { p } else { 1.0 - p }
            })
        }
        (PredsType::Logits, _) => softmax(preds),
        (PredsType::Probs, 1) => {
            DMatrix::from_fn(preds.nrows(), 2, |i, j| {
                if j == 0 {
                    preds[(i, 0)]
                } else {
                    1.0 - preds[(i, 0)]
                }
            })
        }
        (PredsType::Probs, _) => preds.clone(),
    };

    if preds_type == PredsType::Probs && probs.nrows() > 0 {
        let deviation = probs
            .row_iter()
            .map(|r| (r.sum() - 1.0).abs())
            .sum::<f64>()
            / probs.nrows() as f64;
        if deviation > PROB_TOLERANCE || probs.iter().any(|&p| p < 0.0) {
            return Err(Error::InvalidInput(
                "probabilities must be non-negative and sum to 1 per instance; \
                 use PredsType::Logits for unnormalised scores"
                    .to_string(),
            ));
        }
    }
    Ok(probs)
}

/// Shannon entropy of every row, with `0 ln 0 = 0`
pub fn entropy(probs: &DMatrix<f64>) -> Vec<f64> {
    probs
        .row_iter()
        .map(|r| -r.iter().filter(|&&p| p > 0.0).map(|&p| p * p.ln()).sum::<f64>())
        .collect()
}

/// 1 where the two most likely classes are within `margin_width`, else 0
pub fn margin(probs: &DMatrix<f64>, margin_width: f64) -> Vec<f64> {
    probs
        .row_iter()
        .map(|r| {
            let (mut top1, mut top2) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
            for &p in r.iter() {
                if p > top1 {
                    top2 = top1;
                    top1 = p;
                } else if p > top2 {
                    top2 = p;
                }
            }
            if top1 - top2 < margin_width { 1.0 } else { 0.0 }
        })
        .collect()
}

/// Population standard deviation of every row
pub fn population_std(draws: &DMatrix<f64>) -> Vec<f64> {
    let k = draws.ncols() as f64;
    draws
        .row_iter()
        .map(|r| {
            let mean = r.sum() / k;
            (r.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / k).sqrt()
        })
        .collect()
}

/// Apply `f` to consecutive chunks of at most `batch_size` rows and stack the results
pub fn predict_batched<F>(x: &DMatrix<f64>, batch_size: usize, mut f: F) -> Result<DMatrix<f64>>
where
    F: FnMut(&DMatrix<f64>) -> Result<DMatrix<f64>>,
{
    if batch_size == 0 {
        return Err(Error::InvalidParameter("batch_size must be positive".to_string()));
    }
    let mut out: Option<DMatrix<f64>> = None;
    let mut start = 0;
    while start < x.nrows() {
        let end = (start + batch_size).min(x.nrows());
        let rows: Vec<usize> = (start..end).collect();
        let preds = f(&select_rows(x, &rows))?;
        if preds.nrows() != rows.len() {
            return Err(Error::Model(format!(
                "model returned {} rows for a batch of {}",
                preds.nrows(),
                rows.len()
            )));
        }
        out = Some(match out {
            Some(acc) => vstack(&acc, &preds)?,
            None => preds,
        });
        start = end;
    }
    out.ok_or_else(|| Error::empty_input("model inference"))
}

fn column(values: Vec<f64>) -> DMatrix<f64> {
    DMatrix::from_vec(values.len(), 1, values)
}

/// Preprocessor mapping instances to the uncertainty of a classifier
pub struct ClassifierUncertainty<M> {
    model: M,
    preds_type: PredsType,
    uncertainty_type: ClassifierUncertaintyType,
    margin_width: f64,
    batch_size: usize,
}

impl<M: Classifier> ClassifierUncertainty<M> {
    pub fn new(
        model: M,
        preds_type: PredsType,
        uncertainty_type: ClassifierUncertaintyType,
        margin_width: f64,
        batch_size: usize,
    ) -> Self {
        Self {
            model,
            preds_type,
            uncertainty_type,
            margin_width,
            batch_size,
        }
    }

    /// Class probabilities for `x`
    pub fn probs(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let preds = predict_batched(x, self.batch_size, |batch| self.model.predict(batch))?;
        to_probs(&preds, self.preds_type)
    }
}

impl<M: Classifier> Preprocessor for ClassifierUncertainty<M> {
    fn transform(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let probs = self.probs(x)?;
        let scores = match self.uncertainty_type {
            ClassifierUncertaintyType::Entropy => entropy(&probs),
            ClassifierUncertaintyType::Margin => margin(&probs, self.margin_width),
        };
        debug!(
            "{:?} uncertainty over {} instances, {} classes",
            self.uncertainty_type,
            probs.nrows(),
            probs.ncols()
        );
        Ok(column(scores))
    }
}

/// Preprocessor mapping instances to the predictive spread of a regressor
pub struct RegressorUncertainty {
    model: RegressorModel,
    n_evals: usize,
    batch_size: usize,
    rng: Mutex<StdRng>,
}

impl RegressorUncertainty {
    /// `n_evals` only applies to stochastic models
    pub fn new(
        model: RegressorModel,
        n_evals: usize,
        batch_size: usize,
        seed: u64,
    ) -> Result<Self> {
        if matches!(model, RegressorModel::Stochastic(_)) && n_evals < 2 {
            return Err(Error::InvalidParameter(format!(
                "n_evals must be at least 2, got {n_evals}"
            )));
        }
        Ok(Self {
            model,
            n_evals,
            batch_size,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    fn draws(&self, batch: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        match &self.model {
            RegressorModel::Stochastic(model) => {
                let mut rng = self
                    .rng
                    .lock()
                    .map_err(|_| Error::Computation("regressor RNG lock poisoned".to_string()))?;
                let mut out = DMatrix::zeros(batch.nrows(), self.n_evals);
                for e in 0..self.n_evals {
                    let preds: DVector<f64> = model.predict_stochastic(batch, &mut rng)?;
                    if preds.len() != batch.nrows() {
                        return Err(Error::Model(format!(
                            "regressor returned {} predictions for {} instances",
                            preds.len(),
                            batch.nrows()
                        )));
                    }
                    out.set_column(e, &preds);
                }
                Ok(out)
            }
            RegressorModel::Ensemble(model) => {
                let out = model.predict_members(batch)?;
                if out.ncols() == 0 {
                    return Err(Error::Model("ensemble returned no members".to_string()));
                }
                Ok(out)
            }
        }
    }
}

impl Preprocessor for RegressorUncertainty {
    fn transform(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let spread = predict_batched(x, self.batch_size, |batch| {
            Ok(column(population_std(&self.draws(batch)?)))
        })?;
        if spread.iter().any(|v| !v.is_finite()) {
            return Err(Error::Model("regressor returned non-finite predictions".to_string()));
        }
        Ok(spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use drift_core::data::matrix_from_rows;
    use proptest::prelude::*;

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let logits = matrix_from_rows(&[vec![1000.0, 1000.0], vec![0.0, 2.0f64.ln()]]).unwrap();
        let p = softmax(&logits);
        assert_abs_diff_eq!(p[(0, 0)], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(p[(1, 1)], 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_column_is_binary() {
        let probs = to_probs(&matrix_from_rows(&[vec![0.8]]).unwrap(), PredsType::Probs).unwrap();
        assert_eq!(probs.shape(), (1, 2));
        assert_abs_diff_eq!(probs[(0, 1)], 0.2, epsilon = 1e-12);

        let probs = to_probs(&matrix_from_rows(&[vec![0.0]]).unwrap(), PredsType::Logits).unwrap();
        assert_abs_diff_eq!(probs[(0, 0)], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_unnormalised_probs_rejected() {
        let preds = matrix_from_rows(&[vec![0.5, 0.6], vec![0.4, 0.6]]).unwrap();
        assert!(to_probs(&preds, PredsType::Probs).is_err());
        assert!(to_probs(&preds, PredsType::Logits).is_ok());
        assert!(to_probs(&DMatrix::zeros(2, 0), PredsType::Probs).is_err());
    }

    #[test]
    fn test_entropy_and_margin() {
        let probs = matrix_from_rows(&[vec![1.0, 0.0], vec![0.5, 0.5], vec![0.52, 0.48]]).unwrap();
        let h = entropy(&probs);
        assert_eq!(h[0], 0.0);
        assert_abs_diff_eq!(h[1], 2.0f64.ln(), epsilon = 1e-12);

        assert_eq!(margin(&probs, 0.1), vec![0.0, 1.0, 1.0]);
        assert_eq!(margin(&probs, 0.01), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_population_std() {
        let draws = matrix_from_rows(&[vec![1.0, 3.0], vec![2.0, 2.0]]).unwrap();
        assert_eq!(population_std(&draws), vec![1.0, 0.0]);
    }

    #[test]
    fn test_batched_inference_preserves_order() {
        let x = DMatrix::from_fn(70, 1, |i, _| i as f64);
        let mut calls = 0;
        let out = predict_batched(&x, 32, |b| {
            calls += 1;
            Ok(b * 2.0)
        })
        .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(out[(69, 0)], 138.0);
        assert!(predict_batched(&x, 0, |b| Ok(b.clone())).is_err());
        assert!(predict_batched(&x, 32, |_| Ok(DMatrix::zeros(1, 1))).is_err());
    }

    proptest! {
        #[test]
        fn prop_entropy_bounded(
            logits in prop::collection::vec(-20.0f64..20.0, 3..30),
        ) {
            let n = logits.len() / 3;
            let p = softmax(&DMatrix::from_row_slice(n, 3, &logits[..3 * n]));
            for h in entropy(&p) {
                prop_assert!(h >= -1e-12 && h <= 3.0f64.ln() + 1e-12);
            }
        }
    }
}
