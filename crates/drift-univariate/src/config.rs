//! Serializable configs for the univariate detectors

use crate::types::{Alternative, Categories};
use drift_core::{check_p_value, Correction, DriftType, ReferenceUpdate, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Options shared by every univariate detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnivariateConfig {
    /// Significance level of each test
    pub p_val: f64,
    /// Correction used for batch-level decisions
    pub correction: Correction,
    /// Batch-level or feature-level decisions
    pub drift_type: DriftType,
    /// Transform the reference set once at construction
    pub preprocess_at_init: bool,
    /// Reference update policy
    pub update_x_ref: ReferenceUpdate,
    pub return_p_val: bool,
    pub return_distance: bool,
    /// Optional tag describing the input data
    pub data_type: Option<String>,
    /// Seed for reservoir sampling
    pub seed: Option<u64>,
}

impl Default for UnivariateConfig {
    fn default() -> Self {
        Self {
            p_val: 0.05,
            correction: Correction::Bonferroni,
            drift_type: DriftType::Batch,
            preprocess_at_init: true,
            update_x_ref: ReferenceUpdate::Fixed,
            return_p_val: true,
            return_distance: true,
            data_type: None,
            seed: None,
        }
    }
}

impl UnivariateConfig {
    pub fn validate(&self) -> Result<()> {
        check_p_value(self.p_val)?;
        self.update_x_ref.validate()
    }
}

macro_rules! univariate_builders {
    ($config:ty) => {
        impl $config {
            pub fn with_p_val(mut self, p_val: f64) -> Self {
                self.base.p_val = p_val;
                self
            }

            pub fn with_correction(mut self, correction: Correction) -> Self {
                self.base.correction = correction;
                self
            }

            pub fn with_drift_type(mut self, drift_type: DriftType) -> Self {
                self.base.drift_type = drift_type;
                self
            }

            pub fn with_preprocess_at_init(mut self, preprocess_at_init: bool) -> Self {
                self.base.preprocess_at_init = preprocess_at_init;
                self
            }

            pub fn with_update_x_ref(mut self, update_x_ref: ReferenceUpdate) -> Self {
                self.base.update_x_ref = update_x_ref;
                self
            }

            pub fn with_return_p_val(mut self, return_p_val: bool) -> Self {
                self.base.return_p_val = return_p_val;
                self
            }

            pub fn with_return_distance(mut self, return_distance: bool) -> Self {
                self.base.return_distance = return_distance;
                self
            }

            pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
                self.base.data_type = Some(data_type.into());
                self
            }

            pub fn with_seed(mut self, seed: u64) -> Self {
                self.base.seed = Some(seed);
                self
            }
        }
    };
}

/// Config of [`KsDrift`](crate::KsDrift)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KsConfig {
    pub base: UnivariateConfig,
    pub alternative: Alternative,
}

impl KsConfig {
    pub fn with_alternative(mut self, alternative: Alternative) -> Self {
        self.alternative = alternative;
        self
    }
}

/// Config of [`ChiSquareDrift`](crate::ChiSquareDrift)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChiSquareConfig {
    pub base: UnivariateConfig,
    /// Category spec per feature; missing features are inferred from the reference
    pub categories_per_feature: BTreeMap<usize, Categories>,
}

impl ChiSquareConfig {
    pub fn with_categories(mut self, feature: usize, categories: Categories) -> Self {
        self.categories_per_feature.insert(feature, categories);
        self
    }
}

/// Config of [`TabularDrift`](crate::TabularDrift)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabularConfig {
    pub base: UnivariateConfig,
    /// Categorical features; every other feature is treated as continuous
    pub categories_per_feature: BTreeMap<usize, Categories>,
    /// Alternative used for continuous features
    pub alternative: Alternative,
}

impl TabularConfig {
    pub fn with_categories(mut self, feature: usize, categories: Categories) -> Self {
        self.categories_per_feature.insert(feature, categories);
        self
    }

    pub fn with_alternative(mut self, alternative: Alternative) -> Self {
        self.alternative = alternative;
        self
    }
}

univariate_builders!(KsConfig);
univariate_builders!(ChiSquareConfig);
univariate_builders!(TabularConfig);
