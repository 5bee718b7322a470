//! Serializable configs for the kernel detectors

use drift_core::{check_p_value, Error, ReferenceUpdate, Result};
use serde::{Deserialize, Serialize};

fn check_sigma(sigma: &Option<Vec<f64>>) -> Result<()> {
    match sigma {
        Some(s) if s.is_empty() || s.iter().any(|v| !(v.is_finite() && *v > 0.0)) => Err(
            Error::InvalidParameter("sigma must hold positive, finite bandwidths".to_string()),
        ),
        _ => Ok(()),
    }
}

fn check_permutations(n_permutations: usize) -> Result<()> {
    if n_permutations == 0 {
        return Err(Error::InvalidParameter(
            "n_permutations must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Config of [`MmdDrift`](crate::MmdDrift)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmdConfig {
    /// Significance level of the permutation test
    pub p_val: f64,
    pub n_permutations: usize,
    /// Fixed RBF bandwidths; inferred with the median heuristic when absent
    pub sigma: Option<Vec<f64>>,
    /// Infer open kernel parameters once from the reference set
    pub configure_kernel_from_x_ref: bool,
    pub preprocess_at_init: bool,
    pub update_x_ref: ReferenceUpdate,
    pub return_p_val: bool,
    pub return_distance: bool,
    pub data_type: Option<String>,
    /// Seed for permutations and reservoir sampling
    pub seed: Option<u64>,
}

impl Default for MmdConfig {
    fn default() -> Self {
        Self {
            p_val: 0.05,
            n_permutations: 100,
            sigma: None,
            configure_kernel_from_x_ref: true,
            preprocess_at_init: true,
            update_x_ref: ReferenceUpdate::Fixed,
            return_p_val: true,
            return_distance: true,
            data_type: None,
            seed: None,
        }
    }
}

impl MmdConfig {
    pub fn validate(&self) -> Result<()> {
        check_p_value(self.p_val)?;
        check_permutations(self.n_permutations)?;
        check_sigma(&self.sigma)?;
        self.update_x_ref.validate()
    }

    pub fn with_p_val(mut self, p_val: f64) -> Self {
        self.p_val = p_val;
        self
    }

    pub fn with_n_permutations(mut self, n_permutations: usize) -> Self {
        self.n_permutations = n_permutations;
        self
    }

    pub fn with_sigma(mut self, sigma: Vec<f64>) -> Self {
        self.sigma = Some(sigma);
        self
    }

    pub fn with_configure_kernel_from_x_ref(mut self, configure: bool) -> Self {
        self.configure_kernel_from_x_ref = configure;
        self
    }

    pub fn with_preprocess_at_init(mut self, preprocess_at_init: bool) -> Self {
        self.preprocess_at_init = preprocess_at_init;
        self
    }

    pub fn with_update_x_ref(mut self, update_x_ref: ReferenceUpdate) -> Self {
        self.update_x_ref = update_x_ref;
        self
    }

    pub fn with_return_p_val(mut self, return_p_val: bool) -> Self {
        self.return_p_val = return_p_val;
        self
    }

    pub fn with_return_distance(mut self, return_distance: bool) -> Self {
        self.return_distance = return_distance;
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Config of [`ContextMmdDrift`](crate::ContextMmdDrift)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextMmdConfig {
    pub p_val: f64,
    pub n_permutations: usize,
    /// Fixed bandwidths of the data kernel
    pub x_sigma: Option<Vec<f64>>,
    /// Fixed bandwidths of the context kernel
    pub c_sigma: Option<Vec<f64>>,
    /// Share of test contexts held out to condition on
    pub prop_c_held: f64,
    /// Folds used to select the regularisation strengths
    pub n_folds: usize,
    /// Fixed `(reference, test)` regularisation strengths
    pub lams: Option<(f64, f64)>,
    pub preprocess_at_init: bool,
    pub update_ref: ReferenceUpdate,
    pub return_p_val: bool,
    pub return_distance: bool,
    /// Attach the coupling matrices of the observed split
    pub return_coupling: bool,
    pub data_type: Option<String>,
    pub seed: Option<u64>,
}

impl Default for ContextMmdConfig {
    fn default() -> Self {
        Self {
            p_val: 0.05,
            n_permutations: 1000,
            x_sigma: None,
            c_sigma: None,
            prop_c_held: 0.25,
            n_folds: 5,
            lams: None,
            preprocess_at_init: true,
            update_ref: ReferenceUpdate::Fixed,
            return_p_val: true,
            return_distance: true,
            return_coupling: false,
            data_type: None,
            seed: None,
        }
    }
}

impl ContextMmdConfig {
    pub fn validate(&self) -> Result<()> {
        check_p_value(self.p_val)?;
        check_permutations(self.n_permutations)?;
        check_sigma(&self.x_sigma)?;
        check_sigma(&self.c_sigma)?;
        if !(self.prop_c_held > 0.0 && self.prop_c_held < 1.0) {
            return Err(Error::InvalidParameter(format!(
                "prop_c_held must be in (0, 1), got {}",
                self.prop_c_held
            )));
        }
        if self.n_folds < 2 {
            return Err(Error::InvalidParameter(format!(
                "n_folds must be at least 2, got {}",
                self.n_folds
            )));
        }
        if let Some((lam_0, lam_1)) = self.lams {
            if !(lam_0 > 0.0 && lam_1 > 0.0 && lam_0.is_finite() && lam_1.is_finite()) {
                return Err(Error::InvalidParameter(
                    "regularisation strengths must be positive".to_string(),
                ));
            }
        }
        self.update_ref.validate()
    }

    pub fn with_p_val(mut self, p_val: f64) -> Self {
        self.p_val = p_val;
        self
    }

    pub fn with_n_permutations(mut self, n_permutations: usize) -> Self {
        self.n_permutations = n_permutations;
        self
    }

    pub fn with_x_sigma(mut self, sigma: Vec<f64>) -> Self {
        self.x_sigma = Some(sigma);
        self
    }

    pub fn with_c_sigma(mut self, sigma: Vec<f64>) -> Self {
        self.c_sigma = Some(sigma);
        self
    }

    pub fn with_prop_c_held(mut self, prop_c_held: f64) -> Self {
        self.prop_c_held = prop_c_held;
        self
    }

    pub fn with_n_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    pub fn with_lams(mut self, lam_ref: f64, lam_test: f64) -> Self {
        self.lams = Some((lam_ref, lam_test));
        self
    }

    pub fn with_preprocess_at_init(mut self, preprocess_at_init: bool) -> Self {
        self.preprocess_at_init = preprocess_at_init;
        self
    }

    pub fn with_update_ref(mut self, update_ref: ReferenceUpdate) -> Self {
        self.update_ref = update_ref;
        self
    }

    pub fn with_return_p_val(mut self, return_p_val: bool) -> Self {
        self.return_p_val = return_p_val;
        self
    }

    pub fn with_return_distance(mut self, return_distance: bool) -> Self {
        self.return_distance = return_distance;
        self
    }

    pub fn with_return_coupling(mut self, return_coupling: bool) -> Self {
        self.return_coupling = return_coupling;
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
