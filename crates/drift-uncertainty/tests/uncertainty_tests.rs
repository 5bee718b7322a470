//! Uncertainty detectors on synthetic models

mod common;

use approx::assert_relative_eq;
use common::{linear_logits, noisy_regressor, normal_matrix, sigmoid_classifier};
use drift_core::{DetectorProperties, DriftDetector, Error, ReferenceUpdate, Result};
use drift_uncertainty::*;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

fn logits_config() -> ClassifierUncertaintyConfig {
    ClassifierUncertaintyConfig::default().with_preds_type(PredsType::Logits)
}

#[test]
fn test_entropy_no_drift_on_same_distribution() {
    let x_ref = normal_matrix(200, 3, 0.0, 1.0, 1);
    let config = logits_config().with_p_val(0.001);
    let mut cd = ClassifierUncertaintyDrift::from_config(x_ref, linear_logits, config).unwrap();

    let pred = cd.predict(&normal_matrix(200, 3, 0.0, 1.0, 2)).unwrap();
    assert!(!pred.data.is_drift.any());
    assert_eq!(pred.data.p_val.as_ref().map(Vec::len), Some(1));
    assert_eq!(pred.meta.name, "ClassifierUncertaintyDrift");
}

#[test]
fn test_entropy_detects_uncertain_batch() {
    let x_ref = normal_matrix(200, 3, 0.0, 1.0, 3);
    let mut cd =
        ClassifierUncertaintyDrift::from_config(x_ref, linear_logits, logits_config()).unwrap();

    // Shrunk logits push predictions towards uniform
    let x = normal_matrix(200, 3, 0.0, 0.05, 4);
    let pred = cd.predict(&x).unwrap();
    assert!(pred.data.is_drift.any());
    assert!(pred.data.p_val.unwrap()[0] < 1e-6);
}

#[test]
fn test_reference_holds_uncertainty_scores() {
    let x_ref = normal_matrix(50, 3, 0.0, 1.0, 5);
    let cd =
        ClassifierUncertaintyDrift::from_config(x_ref, linear_logits, logits_config()).unwrap();

    let scores = cd.reference_uncertainty();
    assert_eq!(scores.ncols(), 1);
    assert_eq!(scores.nrows(), 50);
    assert_eq!(cd.reference_size(), 50);
    let max_entropy = 3.0_f64.ln();
    assert!(scores.iter().all(|&h| (0.0..=max_entropy + 1e-12).contains(&h)));
}

#[test]
fn test_batch_size_does_not_change_scores() {
    let x_ref = normal_matrix(70, 3, 0.0, 1.0, 6);
    let small = ClassifierUncertaintyDrift::from_config(
        x_ref.clone(),
        linear_logits,
        logits_config().with_batch_size(7),
    )
    .unwrap();
    let large =
        ClassifierUncertaintyDrift::from_config(x_ref, linear_logits, logits_config()).unwrap();

    for (a, b) in small
        .reference_uncertainty()
        .iter()
        .zip(large.reference_uncertainty().iter())
    {
        assert_relative_eq!(a, b, epsilon = 1e-12);
    }
}

#[test]
fn test_margin_detects_more_borderline_predictions() {
    // Confident reference: every instance is far from the decision boundary
    let x_ref = DMatrix::from_fn(200, 1, |i, _| if i % 2 == 0 { 2.0 } else { -2.0 });
    let config = ClassifierUncertaintyConfig::default()
        .with_uncertainty_type(ClassifierUncertaintyType::Margin)
        .with_margin_width(0.2);
    let mut cd =
        ClassifierUncertaintyDrift::from_config(x_ref, sigmoid_classifier, config).unwrap();
    assert!(cd.reference_uncertainty().iter().all(|&v| v == 0.0));

    // Half of the test batch sits on the boundary
    let x = DMatrix::from_fn(200, 1, |i, _| if i % 2 == 0 { 0.0 } else { 2.0 });
    let pred = cd.predict(&x).unwrap();
    assert!(pred.data.is_drift.any());

    let same = DMatrix::from_fn(100, 1, |i, _| if i % 2 == 0 { -2.0 } else { 2.0 });
    assert!(!cd.predict(&same).unwrap().data.is_drift.any());
}

#[test]
fn test_invalid_probabilities_are_rejected() {
    let x_ref = normal_matrix(20, 3, 0.0, 1.0, 7);
    // Raw logits declared as probabilities
    let result = ClassifierUncertaintyDrift::new(x_ref, linear_logits);
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[test]
fn test_model_row_count_is_checked() {
    let broken = |x: &DMatrix<f64>| -> Result<DMatrix<f64>> {
        Ok(DMatrix::from_element(x.nrows() + 1, 2, 0.5))
    };
    let result = ClassifierUncertaintyDrift::new(normal_matrix(10, 2, 0.0, 1.0, 8), broken);
    assert!(matches!(result, Err(Error::Model(_))));
}

#[test]
fn test_mc_dropout_detects_wider_spread() {
    let mut x_ref = normal_matrix(150, 2, 0.0, 1.0, 9);
    x_ref.column_mut(1).fill(0.1);
    let config = RegressorUncertaintyConfig::default()
        .with_uncertainty_type(RegressorUncertaintyType::McDropout { n_evals: 20 })
        .with_seed(3);
    let mut cd = RegressorUncertaintyDrift::from_config(
        x_ref,
        RegressorModel::stochastic(noisy_regressor),
        config,
    )
    .unwrap();

    let mut same = normal_matrix(150, 2, 0.0, 1.0, 10);
    same.column_mut(1).fill(0.1);
    let mut wide = normal_matrix(150, 2, 0.0, 1.0, 11);
    wide.column_mut(1).fill(1.0);

    assert!(cd.predict(&wide).unwrap().data.is_drift.any());
    assert_eq!(cd.name(), "RegressorUncertaintyDrift");

    // Spread of 20 draws with noise scale 0.1 stays near 0.1 in both batches
    let pred = cd.predict(&same).unwrap();
    assert!(pred.data.p_val.unwrap()[0] > 0.001);
}

#[test]
fn test_ensemble_spread_grows_with_input() {
    let members: Vec<Arc<dyn Regressor>> = (0..5)
        .map(|k| {
            let slope = 1.0 + 0.1 * k as f64;
            Arc::new(move |x: &DMatrix<f64>| -> Result<DVector<f64>> {
                Ok(DVector::from_fn(x.nrows(), |i, _| slope * x[(i, 0)]))
            }) as Arc<dyn Regressor>
        })
        .collect();
    let ensemble = RegressorEnsemble::new(members).unwrap();
    assert_eq!(ensemble.len(), 5);

    let x_ref = normal_matrix(100, 1, 0.0, 0.5, 12);
    let mut cd = RegressorUncertaintyDrift::new(x_ref, RegressorModel::ensemble(ensemble)).unwrap();
    assert_eq!(cd.config().uncertainty_type, RegressorUncertaintyType::Ensemble);

    let pred = cd.predict(&normal_matrix(100, 1, 5.0, 0.5, 13)).unwrap();
    assert!(pred.data.is_drift.any());
}

#[test]
fn test_model_and_uncertainty_type_must_match() {
    let ensemble = |x: &DMatrix<f64>| -> Result<DMatrix<f64>> { Ok(DMatrix::zeros(x.nrows(), 3)) };
    let result = RegressorUncertaintyDrift::from_config(
        normal_matrix(10, 1, 0.0, 1.0, 14),
        RegressorModel::ensemble(ensemble),
        RegressorUncertaintyConfig::default(),
    );
    assert!(matches!(result, Err(Error::InvalidParameter(_))));

    let config = RegressorUncertaintyConfig::default()
        .with_uncertainty_type(RegressorUncertaintyType::McDropout { n_evals: 1 });
    let result = RegressorUncertaintyDrift::from_config(
        normal_matrix(10, 2, 0.0, 1.0, 15),
        RegressorModel::stochastic(noisy_regressor),
        config,
    );
    assert!(matches!(result, Err(Error::InvalidParameter(_))));
}

#[test]
fn test_last_n_reference_keeps_uncertainty_scores() {
    let config = logits_config().with_update_x_ref(ReferenceUpdate::LastN(60));
    let mut cd = ClassifierUncertaintyDrift::from_config(
        normal_matrix(40, 3, 0.0, 1.0, 16),
        linear_logits,
        config,
    )
    .unwrap();

    cd.predict(&normal_matrix(40, 3, 0.0, 1.0, 17)).unwrap();
    assert_eq!(cd.reference_size(), 60);
    assert_eq!(cd.reference_uncertainty().ncols(), 1);
}

#[test]
fn test_prediction_json() {
    let config = logits_config().with_data_type("tabular");
    let mut cd = ClassifierUncertaintyDrift::from_config(
        normal_matrix(30, 3, 0.0, 1.0, 18),
        linear_logits,
        config,
    )
    .unwrap();
    let json = cd.predict(&normal_matrix(30, 3, 0.0, 1.0, 19)).unwrap().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["meta"]["name"], "ClassifierUncertaintyDrift");
    assert_eq!(value["meta"]["data_type"], "tabular");
    assert!(value["data"]["p_val"].is_array());
}
