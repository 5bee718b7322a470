//! Two-sample Kolmogorov-Smirnov test
//!
//! The statistic is the largest gap between the two empirical CDFs,
//! evaluated at every observed value. P-values use the asymptotic
//! Kolmogorov distribution (two-sided) and Smirnov's formula (one-sided),
//! both with the effective sample size `m n / (m + n)`.

use crate::config::KsConfig;
use crate::detector::UnivariateDrift;
use crate::traits::FeatureScorer;
use crate::types::{Alternative, FeatureScores};
use drift_core::data::column_values;
use drift_core::{Error, Result, SharedPreprocessor};
use nalgebra::DMatrix;
use std::f64::consts::PI;

/// Two-sample KS test result: `(statistic, p_value)`
pub fn ks_2samp(x: &[f64], y: &[f64], alternative: Alternative) -> Result<(f64, f64)> {
    if x.is_empty() || y.is_empty() {
        return Err(Error::empty_input("ks_2samp"));
    }
    if x.iter().chain(y.iter()).any(|v| v.is_nan()) {
        return Err(Error::non_finite("KS sample"));
    }

    let (d_plus, d_minus) = ecdf_extremes(x, y);
    let d = match alternative {
        Alternative::TwoSided => d_plus.max(d_minus),
        Alternative::Greater => d_plus,
        Alternative::Less => d_minus,
    };

    let (n1, n2) = (x.len() as f64, y.len() as f64);
    let (m, n) = if n1 >= n2 { (n1, n2) } else { (n2, n1) };
    let en = m * n / (m + n);
    let z = en.sqrt() * d;

    let p = match alternative {
        Alternative::TwoSided => kolmogorov_sf(z),
        Alternative::Less | Alternative::Greater => {
            let expt = -2.0 * z * z - 2.0 * z * (m + 2.0 * n) / (m * n * (m + n)).sqrt() / 3.0;
            expt.exp()
        }
    };
    Ok((d, p.clamp(0.0, 1.0)))
}

/// Largest positive and negative gaps of `F_x - F_y`
fn ecdf_extremes(x: &[f64], y: &[f64]) -> (f64, f64) {
    let mut xs = x.to_vec();
    let mut ys = y.to_vec();
    xs.sort_by(|a, b| a.total_cmp(b));
    ys.sort_by(|a, b| a.total_cmp(b));

    let (n1, n2) = (xs.len() as f64, ys.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let (mut d_plus, mut d_minus) = (0.0f64, 0.0f64);

    while i < xs.len() || j < ys.len() {
        // Next distinct value in the pooled sample
        let v = match (xs.get(i), ys.get(j)) {
            (Some(&a), Some(&b)) => a.min(b),
            (Some(&a), None) => a,
            (None, Some(&b)) => b,
            (None, None) => break,
        };
        while i < xs.len() && xs[i] <= v {
            i += 1;
        }
        while j < ys.len() && ys[j] <= v {
            j += 1;
        }
        let diff = i as f64 / n1 - j as f64 / n2;
        d_plus = d_plus.max(diff);
        d_minus = d_minus.max(-diff);
    }
    (d_plus, d_minus)
}

/// Survival function of the limiting Kolmogorov distribution
///
/// Uses the theta-function form for small `z`, where the alternating
/// series converges slowly.
pub fn kolmogorov_sf(z: f64) -> f64 {
    if z <= 0.0 {
        return 1.0;
    }
    if z < 1.0 {
        let factor = (2.0 * PI).sqrt() / z;
        let w = PI * PI / (8.0 * z * z);
        let cdf: f64 = (1..=20)
            .map(|k| {
                let odd = (2 * k - 1) as f64;
                (-odd * odd * w).exp()
            })
            .sum::<f64>()
            * factor;
        return (1.0 - cdf).clamp(0.0, 1.0);
    }
    let mut sum = 0.0;
    for k in 1..=100 {
        let kf = k as f64;
        let term = (-2.0 * kf * kf * z * z).exp();
        sum += if k % 2 == 1 { term } else { -term };
        if term < 1e-18 {
            break;
        }
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

/// Feature-wise KS scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct KsScorer {
    alternative: Alternative,
}

impl KsScorer {
    pub fn new(alternative: Alternative) -> Self {
        Self { alternative }
    }

    pub fn alternative(&self) -> Alternative {
        self.alternative
    }
}

impl FeatureScorer for KsScorer {
    fn detector_name(&self) -> &'static str {
        "KsDrift"
    }

    fn score(&self, x_ref: &DMatrix<f64>, x: &DMatrix<f64>) -> Result<FeatureScores> {
        let mut scores = FeatureScores::with_capacity(x_ref.ncols());
        for f in 0..x_ref.ncols() {
            let (dist, p) = ks_2samp(
                &column_values(x_ref, f),
                &column_values(x, f),
                self.alternative,
            )?;
            scores.push(p, dist);
        }
        Ok(scores)
    }
}

/// Feature-wise Kolmogorov-Smirnov drift detector for continuous data
pub type KsDrift = UnivariateDrift<KsScorer>;

impl UnivariateDrift<KsScorer> {
    /// Detector with default settings (p = 0.05, Bonferroni, two-sided)
    pub fn new(x_ref: DMatrix<f64>) -> Result<Self> {
        Self::from_config(x_ref, KsConfig::default())
    }

    pub fn from_config(x_ref: DMatrix<f64>, config: KsConfig) -> Result<Self> {
        Self::with_preprocessor(x_ref, config, None)
    }

    pub fn with_preprocessor(
        x_ref: DMatrix<f64>,
        config: KsConfig,
        preprocessor: Option<SharedPreprocessor>,
    ) -> Result<Self> {
        UnivariateDrift::with_scorer(
            x_ref,
            KsScorer::new(config.alternative),
            config.base,
            preprocessor,
        )
    }
}
